use crate::*;

use ferry_services::TransferEvent;

async fn round_trip(size: usize) -> Result<()> {
    let src = TestDir::new("src");
    let dest = TestDir::new("dest");
    let payload = pattern(size);
    let source = src.file("payload.bin", &payload);

    let (listener, mut events) = start_listener(loopback_config(dest.path())).await?;
    let (sender, mut sent_events) = sender();

    let report = sender
        .send_file(&source, "127.0.0.1", listener.local_addr().port())
        .await?;
    assert_eq!(report.bytes_sent, size as u64);

    let received = collect_terminal(&mut events, 1).await?;
    let path = completed_path(&received)?;
    assert!(path.starts_with(dest.path()));
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_payload.bin"));
    let on_disk = std::fs::read(&path)?;
    assert_eq!(on_disk.len(), size);
    assert!(on_disk == payload, "received bytes differ from source");

    match received.last() {
        Some(TransferEvent::Completed { bytes, .. }) => assert_eq!(*bytes, size as u64),
        other => panic!("last event should be Completed, got {other:?}"),
    }

    let outgoing = collect_terminal(&mut sent_events, 1).await?;
    assert!(matches!(
        outgoing.last(),
        Some(TransferEvent::Completed { .. })
    ));

    listener.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn small_file_round_trips() -> Result<()> {
    round_trip(1500).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_file_round_trips() -> Result<()> {
    round_trip(0).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ten_mebibytes_round_trip() -> Result<()> {
    round_trip(10 * 1024 * 1024).await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chunk_boundary_sizes_round_trip() -> Result<()> {
    for size in [1, 4095, 4096, 4097] {
        round_trip(size).await?;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn progress_is_monotonic_and_ends_at_100() -> Result<()> {
    let src = TestDir::new("src");
    let dest = TestDir::new("dest");
    let source = src.file("progress.bin", &pattern(1024 * 1024));

    let (listener, mut events) = start_listener(loopback_config(dest.path())).await?;
    let (sender, mut sent_events) = sender();
    sender
        .send_file(&source, "127.0.0.1", listener.local_addr().port())
        .await?;

    let received = collect_terminal(&mut events, 1).await?;
    let percents = incoming_percents(&received);
    assert!(!percents.is_empty());
    assert!(percents.windows(2).all(|w| w[0] < w[1]), "{percents:?}");
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.len() <= 101);
    assert!(matches!(received.first(), Some(TransferEvent::Started { total_bytes: 1048576, .. })));

    let sent = collect_terminal(&mut sent_events, 1).await?;
    let sent_percents: Vec<u8> = sent
        .iter()
        .filter_map(|e| match e {
            TransferEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(sent_percents.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(sent_percents.last(), Some(&100));

    listener.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_file_reports_100_before_completion() -> Result<()> {
    let src = TestDir::new("src");
    let dest = TestDir::new("dest");
    let source = src.file("empty.txt", b"");

    let (listener, mut events) = start_listener(loopback_config(dest.path())).await?;
    let (sender, _sent) = sender();
    sender
        .send_file(&source, "127.0.0.1", listener.local_addr().port())
        .await?;

    let received = collect_terminal(&mut events, 1).await?;
    assert_eq!(incoming_percents(&received), vec![100]);
    assert!(matches!(received.last(), Some(TransferEvent::Completed { bytes: 0, .. })));
    assert_eq!(std::fs::metadata(completed_path(&received)?)?.len(), 0);

    listener.stop().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn only_the_base_name_is_kept() -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let dest = TestDir::new("dest");
    let (listener, mut events) = start_listener(loopback_config(dest.path())).await?;

    let mut conn = tokio::net::TcpStream::connect(listener.local_addr()).await?;
    let header = ferry_core::wire::encode_header("C:\\Users\\someone\\notes.txt", 5)?;
    conn.write_all(&header).await?;
    conn.write_all(b"hello").await?;
    conn.shutdown().await?;

    let received = collect_terminal(&mut events, 1).await?;
    let path = completed_path(&received)?;
    assert_eq!(path.parent(), Some(dest.path()));
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("_notes.txt"));
    assert_eq!(std::fs::read(&path)?, b"hello");

    listener.stop().await?;
    Ok(())
}
