//! WebSocket transport adapter
//!
//! Bridges axum's WebSocket halves to the session: the read half becomes a
//! [`FragmentSource`] that hands out each message in slices of at most the
//! requested size, and the write half is driven by a writer task draining
//! the connection's outbound queue.

use std::fmt::Display;

use axum::extract::ws::{self, Message};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::protocol::{
    CloseFrame, Fragment, FragmentKind, FragmentSource, MessageKind, Outbound, TransportError,
};

/// Reads WebSocket messages as bounded fragments
pub struct WsFragmentReader<S> {
    stream: S,
    /// Unread remainder of the current message
    pending: Option<(MessageKind, Bytes)>,
    open: bool,
}

impl<S> WsFragmentReader<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            pending: None,
            open: true,
        }
    }
}

impl<S, E> FragmentSource for WsFragmentReader<S>
where
    S: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display + Send,
{
    async fn read_fragment(&mut self, max_len: usize) -> Result<Option<Fragment>, TransportError> {
        loop {
            if let Some((kind, mut data)) = self.pending.take() {
                let end_of_message = data.len() <= max_len;
                let chunk = if end_of_message {
                    data
                } else {
                    let head = data.split_to(max_len.max(1));
                    self.pending = Some((kind, data));
                    head
                };

                let kind = match kind {
                    MessageKind::Text => FragmentKind::Text,
                    MessageKind::Binary => FragmentKind::Binary,
                };
                return Ok(Some(Fragment {
                    kind,
                    data: chunk,
                    end_of_message,
                }));
            }

            match self.stream.next().await {
                None => {
                    self.open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.open = false;
                    return Err(TransportError::Read(e.to_string()));
                }
                Some(Ok(Message::Text(text))) => {
                    self.pending = Some((
                        MessageKind::Text,
                        Bytes::copy_from_slice(text.as_str().as_bytes()),
                    ));
                }
                Some(Ok(Message::Binary(data))) => {
                    self.pending = Some((MessageKind::Binary, data));
                }
                Some(Ok(Message::Close(frame))) => {
                    let frame = frame.map(|f| CloseFrame::new(f.code, f.reason.as_str()));
                    return Ok(Some(Fragment::close(frame)));
                }
                // Answered by the WebSocket layer
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Spawn the writer task for one connection
///
/// Stops after writing a close frame, on the first write error, or when
/// every sender of `rx` is gone.
pub fn spawn_writer<W>(mut sink: W, mut rx: mpsc::Receiver<Outbound>, session_id: u64) -> JoinHandle<()>
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
{
    tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let (message, closing) = into_message(outbound);

            if let Err(e) = sink.send(message).await {
                tracing::debug!(session_id = session_id, error = %e, "Write failed");
                break;
            }
            if closing {
                break;
            }
        }

        rx.close();
        if let Err(e) = sink.close().await {
            tracing::debug!(session_id = session_id, error = %e, "Sink close failed");
        }
    })
}

fn into_message(outbound: Outbound) -> (Message, bool) {
    match outbound {
        Outbound::Text(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => (Message::Text(text.to_owned().into()), false),
            Err(_) => (Message::Binary(bytes), false),
        },
        Outbound::Close(frame) => {
            let frame = frame.map(|f| ws::CloseFrame {
                code: f.code,
                reason: f.reason.into(),
            });
            (Message::Close(frame), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;

    use super::*;

    type Item = Result<Message, std::io::Error>;

    fn reader(messages: Vec<Item>) -> WsFragmentReader<stream::Iter<std::vec::IntoIter<Item>>> {
        WsFragmentReader::new(stream::iter(messages))
    }

    #[tokio::test]
    async fn test_message_sliced_to_read_size() {
        let mut reader = reader(vec![Ok(Message::Text("abcdefgh".to_string().into()))]);

        let first = reader.read_fragment(3).await.unwrap().unwrap();
        assert_eq!(first, Fragment::text(&b"abc"[..], false));
        let second = reader.read_fragment(3).await.unwrap().unwrap();
        assert_eq!(second, Fragment::text(&b"def"[..], false));
        let third = reader.read_fragment(3).await.unwrap().unwrap();
        assert_eq!(third, Fragment::text(&b"gh"[..], true));

        assert_eq!(reader.read_fragment(3).await.unwrap(), None);
        assert!(!reader.is_open());
    }

    #[tokio::test]
    async fn test_control_frames_skipped_and_close_mapped() {
        let mut reader = reader(vec![
            Ok(Message::Ping(Bytes::from_static(b"p"))),
            Ok(Message::Binary(Bytes::from_static(b"\x01\x02"))),
            Ok(Message::Close(Some(ws::CloseFrame {
                code: 1001,
                reason: "leaving".to_string().into(),
            }))),
        ]);

        let binary = reader.read_fragment(64).await.unwrap().unwrap();
        assert_eq!(binary, Fragment::binary(&b"\x01\x02"[..], true));

        let close = reader.read_fragment(64).await.unwrap().unwrap();
        assert_eq!(close, Fragment::close(Some(CloseFrame::new(1001, "leaving"))));
    }

    #[tokio::test]
    async fn test_stream_error_marks_closed() {
        let mut reader = reader(vec![Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ))]);

        let err = reader.read_fragment(64).await.unwrap_err();
        assert!(matches!(err, TransportError::Read(ref msg) if msg.contains("reset")));
        assert!(!reader.is_open());
    }

    #[tokio::test]
    async fn test_writer_stops_after_close() {
        let (sink, mut written) = futures::channel::mpsc::unbounded::<Message>();
        let (tx, rx) = mpsc::channel(4);
        let writer = spawn_writer(sink, rx, 1);

        tx.send(Outbound::Text(Bytes::from_static(b"{\"status\":\"OK\"}")))
            .await
            .unwrap();
        tx.send(Outbound::Close(Some(CloseFrame::new(1008, "busy"))))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap();
        assert!(tx.is_closed());

        match written.next().await {
            Some(Message::Text(text)) => assert_eq!(text.as_str(), "{\"status\":\"OK\"}"),
            other => panic!("unexpected {:?}", other),
        }
        match written.next().await {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, 1008);
                assert_eq!(frame.reason.as_str(), "busy");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
