//! Native messaging transport. Every message is a json document preceded by its length as a
//! 32-bit integer in native byte order.

use std::{future, io};

use anyhow::{anyhow, Result};
use bytes::{Buf, Bytes, BytesMut};
use futures::{SinkExt, Stream, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::codec::{Decoder, FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, trace, warn};

use crate::tabs::TabId;

use super::{
    messages::{InboundMessage, OutboundMessage},
    BrowserHost, PageStyle, BLOCKED_PAGE_PATH,
};

/// Browsers refuse host messages larger than this.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;
/// Largest message accepted from the browser.
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

fn native_codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(LENGTH_FIELD)
        .native_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}

const LENGTH_FIELD: usize = 4;

/// Result of decoding one inbound frame.
#[derive(Debug, PartialEq)]
enum InboundFrame {
    Message(BytesMut),
    /// A frame of the given length over the limit. Its body is discarded as it arrives.
    Oversized(usize),
}

/// Splits the browser's byte stream into frames. Unlike [LengthDelimitedCodec] a frame over the
/// limit doesn't fail the stream: it is reported and skipped, and decoding resumes after it.
struct InboundCodec {
    max_frame_length: usize,
    skipping: usize,
}

impl InboundCodec {
    fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length,
            skipping: 0,
        }
    }
}

impl Decoder for InboundCodec {
    type Item = InboundFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<InboundFrame>, io::Error> {
        if self.skipping > 0 {
            let skipped = self.skipping.min(src.len());
            src.advance(skipped);
            self.skipping -= skipped;
            if self.skipping > 0 {
                return Ok(None);
            }
        }
        if src.len() < LENGTH_FIELD {
            return Ok(None);
        }

        let length = (&src[..LENGTH_FIELD]).get_u32_ne() as usize;
        if length > self.max_frame_length {
            src.advance(LENGTH_FIELD);
            let skipped = length.min(src.len());
            src.advance(skipped);
            self.skipping = length - skipped;
            return Ok(Some(InboundFrame::Oversized(length)));
        }
        if src.len() < LENGTH_FIELD + length {
            src.reserve(LENGTH_FIELD + length - src.len());
            return Ok(None);
        }
        src.advance(LENGTH_FIELD);
        Ok(Some(InboundFrame::Message(src.split_to(length))))
    }
}

/// Decodes messages coming from the browser. Frames that aren't valid messages, or are larger
/// than [MAX_INBOUND_FRAME], are logged and skipped; transport errors end up in the stream.
pub fn read_messages(
    reader: impl AsyncRead + Unpin,
) -> impl Stream<Item = Result<InboundMessage>> {
    read_messages_limited(reader, MAX_INBOUND_FRAME)
}

fn read_messages_limited(
    reader: impl AsyncRead + Unpin,
    max_frame_length: usize,
) -> impl Stream<Item = Result<InboundMessage>> {
    FramedRead::new(reader, InboundCodec::new(max_frame_length)).filter_map(|frame| {
        future::ready(match frame {
            Ok(InboundFrame::Message(frame)) => {
                match serde_json::from_slice::<InboundMessage>(&frame) {
                    Ok(message) => Some(Ok(message)),
                    Err(e) => {
                        warn!(
                            "Skipping malformed message {}: {e}",
                            String::from_utf8_lossy(&frame)
                        );
                        None
                    }
                }
            }
            Ok(InboundFrame::Oversized(length)) => {
                warn!("Skipping message of {length} bytes, over the limit");
                None
            }
            Err(e) => Some(Err(e.into())),
        })
    })
}

/// Writes queued messages until every [NativeHost] handle is dropped.
pub async fn write_messages(
    writer: impl AsyncWrite + Unpin,
    mut receiver: mpsc::UnboundedReceiver<OutboundMessage>,
) -> Result<()> {
    let mut sink = FramedWrite::new(writer, native_codec(MAX_OUTBOUND_FRAME));
    while let Some(message) = receiver.recv().await {
        let frame = serde_json::to_vec(&message)?;
        if frame.len() > MAX_OUTBOUND_FRAME {
            warn!("Dropping message of {} bytes, over the browser limit", frame.len());
            continue;
        }
        trace!("Sending {:?}", message);
        sink.send(Bytes::from(frame)).await?;
    }
    debug!("Outbound queue closed");
    Ok(())
}

/// Handle used by the background logic to send messages to the extension. Cloning is cheap, all
/// clones feed the same writer.
#[derive(Clone)]
pub struct NativeHost {
    origin: String,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

impl NativeHost {
    /// `origin` is the caller origin passed by the browser, e.g. `chrome-extension://<id>/`.
    pub fn new(origin: &str, outbound: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        let mut origin = origin.to_owned();
        if !origin.ends_with('/') {
            origin.push('/');
        }
        Self { origin, outbound }
    }

    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|e| anyhow!("Outbound channel is closed, dropped {:?}", e.0))
    }
}

impl BrowserHost for NativeHost {
    fn redirect_tab(&mut self, tab: TabId, url: &str) -> Result<()> {
        self.send(OutboundMessage::Redirect {
            tab_id: tab,
            url: url.to_owned(),
        })
    }

    fn blocked_page_url(&self) -> String {
        format!("{}{BLOCKED_PAGE_PATH}", self.origin)
    }
}

impl PageStyle for NativeHost {
    fn inject(&mut self, id: &str, css: &str) -> Result<()> {
        self.send(OutboundMessage::InjectStyle {
            tab_id: None,
            id: id.to_owned(),
            css: css.to_owned(),
        })
    }

    fn inject_into(&mut self, tab: TabId, id: &str, css: &str) -> Result<()> {
        self.send(OutboundMessage::InjectStyle {
            tab_id: Some(tab),
            id: id.to_owned(),
            css: css.to_owned(),
        })
    }

    fn remove(&mut self, id: &str) -> Result<()> {
        self.send(OutboundMessage::RemoveStyle { id: id.to_owned() })
    }
}
