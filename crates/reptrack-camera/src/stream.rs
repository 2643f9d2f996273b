// reptrack-camera/src/stream.rs
use crate::{FrameSource, Result, VideoFrame};
use futures_core::Stream;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Frames the reader may run ahead of the consumer.
///
/// Replay reads are cheap and the pipeline mailbox keeps only the newest
/// frame anyway, so a few frames absorb file I/O jitter and anything deeper
/// only adds latency between a read and its submission.
const DEPTH: usize = 4;

/// Drive `source` on its own thread and expose the frames as an async stream.
///
/// The stream ends when the source is exhausted, after the first error, or
/// when the consumer drops the stream. The source is dropped on the reader
/// thread once it stops.
pub fn frame_stream<S>(source: S) -> impl Stream<Item = Result<VideoFrame>>
where
    S: FrameSource + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEPTH);
    let spawned = std::thread::Builder::new()
        .name("frame-reader".into())
        .spawn(move || pump(source, tx));
    if let Err(e) = spawned {
        // the sender went down with the closure, so the stream is simply empty
        warn!("could not start frame reader: {e}");
    }
    ReceiverStream::new(rx)
}

fn pump<S: FrameSource>(mut source: S, tx: mpsc::Sender<Result<VideoFrame>>) {
    let mut read = 0u64;
    let reason = loop {
        match source.next_frame() {
            Ok(Some(frame)) => {
                read += 1;
                if tx.blocking_send(Ok(frame)).is_err() {
                    break "consumer dropped";
                }
            }
            Ok(None) => break "source exhausted",
            Err(e) => {
                warn!("frame source failed: {e}");
                let _ = tx.blocking_send(Err(e));
                break "source failed";
            }
        }
    };
    debug!("frame reader stopped after {read} frame(s): {reason}");
}
