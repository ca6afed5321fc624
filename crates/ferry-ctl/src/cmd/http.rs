//! Shared HTTP request helpers for commands that talk to ferryd.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}/api", port)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to ferryd at {}, is it running?", url))?
        .error_for_status()
        .context("ferryd returned an error")?
        .json::<T>()
        .await
        .context("failed to parse response")
}

pub async fn post_json_body<T, R>(url: &str, body: &T) -> Result<R>
where
    T: Serialize,
    R: for<'de> Deserialize<'de>,
{
    let resp = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to connect to ferryd at {}, is it running?", url))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("ferryd returned {status}: {text}");
    }
    resp.json::<R>().await.context("failed to parse response")
}

pub async fn post_empty<R: for<'de> Deserialize<'de>>(url: &str) -> Result<R> {
    reqwest::Client::new()
        .post(url)
        .send()
        .await
        .with_context(|| format!("failed to connect to ferryd at {}, is it running?", url))?
        .json::<R>()
        .await
        .context("failed to parse response")
}
