use crate::events::Event;
use crate::types::OutputBlob;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Largest chunk delivered in a single output event.
pub const CHUNK_SIZE: usize = 3840;

/// Forward everything read from `reader` as events until end of stream.
///
/// Each successful read becomes one event, so output reaches the client as soon as the child
/// produces it. Stops early if the receiving side has gone away.
pub(crate) async fn pump<R>(
    mut reader: R,
    wrap: fn(OutputBlob) -> Event,
    events: mpsc::Sender<Event>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(CHUNK_SIZE);
    loop {
        buf.reserve(CHUNK_SIZE);
        let read = reader.read_buf(&mut (&mut buf).limit(CHUNK_SIZE)).await;
        match read {
            Ok(0) => break,
            Ok(_) => {
                // move the bytes out of buf and into a message
                let msg = wrap(buf.split().freeze());
                if events.send(msg).await.is_err() {
                    debug!("event receiver dropped, stopping output pump");
                    break;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!("failed to read job output: {}", err);
                break;
            }
        }
    }
}

/// Write the job's input to its stdin, then close it.
pub(crate) async fn feed<W>(mut writer: W, input: Bytes)
where
    W: AsyncWrite + Unpin,
{
    if let Err(err) = writer.write_all(&input).await {
        // the child is free to exit without reading its input
        if err.kind() != io::ErrorKind::BrokenPipe {
            warn!("failed to write job input: {}", err);
        }
        return;
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(input: &'static [u8]) -> Vec<Bytes> {
        let (tx, mut rx) = mpsc::channel(16);
        pump(input, Event::Stdout, tx).await;
        let mut chunks = vec![];
        while let Some(event) = rx.recv().await {
            match event {
                Event::Stdout(blob) => chunks.push(blob),
                other => panic!("unexpected event {:?}", other),
            }
        }
        chunks
    }

    #[tokio::test]
    async fn splits_large_reads_into_chunks() {
        static DATA: [u8; CHUNK_SIZE * 3] = [0; CHUNK_SIZE * 3];
        let chunks = collect(&DATA).await;
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.len() == CHUNK_SIZE));
    }

    #[tokio::test]
    async fn keeps_binary_content_intact() {
        let chunks = collect(b"a\0b\xff").await;
        assert_eq!(chunks, vec![Bytes::from_static(b"a\0b\xff")]);
    }

    #[tokio::test]
    async fn empty_stream_emits_nothing() {
        assert!(collect(b"").await.is_empty());
    }

    #[tokio::test]
    async fn stops_when_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        // would loop forever on an endless reader if the send error were ignored
        pump(tokio::io::repeat(b'y'), Event::Stdout, tx).await;
    }

    #[tokio::test]
    async fn feed_writes_everything() {
        let (mut reader, writer) = tokio::io::duplex(8);
        let task = tokio::spawn(feed(writer, Bytes::from_static(b"hello world")));
        let mut out = vec![];
        reader.read_to_end(&mut out).await.unwrap();
        task.await.unwrap();
        assert_eq!(out, b"hello world");
    }
}
