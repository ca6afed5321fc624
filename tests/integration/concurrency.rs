use crate::*;

use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use ferry_services::TransferEvent;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_name_from_two_senders_gives_two_files() -> Result<()> {
    let src = TestDir::new("src");
    let dest = TestDir::new("dest");
    let first = src.file("a/report.txt", b"first sender");
    let second = src.file("b/report.txt", b"second sender, longer");

    let (listener, mut events) = start_listener(loopback_config(dest.path())).await?;
    let port = listener.local_addr().port();
    let (sender, _sent) = sender();

    let (r1, r2) = tokio::join!(
        sender.send_file(&first, "127.0.0.1", port),
        sender.send_file(&second, "127.0.0.1", port),
    );
    r1?;
    r2?;

    collect_terminal(&mut events, 2).await?;
    let entries = dest.entries();
    assert_eq!(entries.len(), 2, "{entries:?}");
    assert!(entries.iter().all(|n| n.ends_with("_report.txt")));

    let mut contents: Vec<Vec<u8>> = entries
        .iter()
        .map(|n| std::fs::read(dest.path().join(n)))
        .collect::<std::io::Result<_>>()?;
    contents.sort();
    assert_eq!(
        contents,
        vec![b"first sender".to_vec(), b"second sender, longer".to_vec()]
    );

    listener.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn eight_senders_through_five_workers_all_complete() -> Result<()> {
    let src = TestDir::new("src");
    let dest = TestDir::new("dest");
    let files: Vec<(PathBuf, Vec<u8>)> = (0..8)
        .map(|i| {
            let payload = pattern(256 * 1024 + i * 100);
            (src.file(&format!("f{i}.bin"), &payload), payload)
        })
        .collect();

    let mut config = loopback_config(dest.path());
    config.workers = 5;
    let (listener, mut events) = start_listener(config).await?;
    let port = listener.local_addr().port();

    // Sample the pool while the transfers run.
    let stats = listener.pool_stats();
    let peak = Arc::new(AtomicUsize::new(0));
    let sampler = {
        let peak = peak.clone();
        tokio::spawn(async move {
            loop {
                peak.fetch_max(stats.busy(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let (sender, _sent) = sender();
    let tasks: Vec<_> = files
        .iter()
        .map(|(path, _)| {
            sender
                .spawn(ferry_services::TransferRequest::new(path, "127.0.0.1", port))
                .1
        })
        .collect();
    for result in futures::future::join_all(tasks).await {
        result??;
    }

    let received = collect_terminal(&mut events, 8).await?;
    sampler.abort();

    let completed = received
        .iter()
        .filter(|e| matches!(e, TransferEvent::Completed { .. }))
        .count();
    assert_eq!(completed, 8);
    assert!(peak.load(Ordering::SeqCst) <= 5);

    let entries = dest.entries();
    assert_eq!(entries.len(), 8);
    for (path, payload) in &files {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let stored = entries
            .iter()
            .find(|n| n.ends_with(&format!("_{name}")))
            .with_context(|| format!("{name} not received"))?;
        assert!(std::fs::read(dest.path().join(stored))? == *payload);
    }

    listener.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_lets_in_flight_transfer_finish() -> Result<()> {
    let dest = TestDir::new("dest");
    let (listener, mut events) = start_listener(loopback_config(dest.path())).await?;
    let addr = listener.local_addr();

    let mut conn = TcpStream::connect(addr).await?;
    conn.write_all(&ferry_core::wire::encode_header("slow.bin", 100)?)
        .await?;
    conn.write_all(&[1u8; 50]).await?;
    wait_for(&mut events, |e| matches!(e, TransferEvent::Started { .. })).await?;

    let stopping = tokio::spawn(listener.stop());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!stopping.is_finished(), "stop must wait for the running handler");

    // New connections are no longer accepted.
    assert!(TcpStream::connect(addr).await.is_err());

    conn.write_all(&[2u8; 50]).await?;
    conn.shutdown().await?;
    stopping.await??;

    let event = wait_for(&mut events, is_terminal).await?;
    let path = match event {
        TransferEvent::Completed { path, bytes, .. } => {
            assert_eq!(bytes, 100);
            path
        }
        other => bail!("expected completion, got {other:?}"),
    };
    let stored = std::fs::read(path)?;
    assert_eq!(&stored[..50], &[1u8; 50]);
    assert_eq!(&stored[50..], &[2u8; 50]);

    assert!(matches!(
        wait_for(&mut events, |e| matches!(e, TransferEvent::ListenerStopped { .. })).await?,
        TransferEvent::ListenerStopped { error: None, .. }
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dropping_the_handle_stops_the_listener() -> Result<()> {
    let dest = TestDir::new("dest");
    let (listener, mut events) = start_listener(loopback_config(dest.path())).await?;
    let addr = listener.local_addr();
    drop(listener);

    wait_for(&mut events, |e| matches!(e, TransferEvent::ListenerStopped { .. })).await?;
    assert!(TcpStream::connect(addr).await.is_err());
    Ok(())
}
