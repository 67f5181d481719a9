use bytes::Bytes;

/// Transport-neutral websocket frame type.
///
/// Transports convert their native frame representation into `WsFrame`; the connection
/// manager only ever looks at this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

impl WsCloseFrame {
    /// Human readable close reason, as reported to the lifecycle hooks.
    pub fn describe(&self) -> String {
        format!(
            "code={} reason={}",
            self.code,
            String::from_utf8_lossy(self.reason.as_ref())
        )
    }
}

impl WsFrame {
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(Bytes::from(s.into()))
    }

    #[inline]
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close(Some(WsCloseFrame {
            code,
            reason: Bytes::from(reason.into()),
        }))
    }
}

/// What the reader loop should do with a frame pulled off the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameDisposition {
    /// A data frame carrying one opaque payload for the sink.
    Payload(String),
    /// Control or undecodable frame; never reaches the sink.
    Skip,
    /// The peer closed the connection.
    Closed(String),
}

/// Classify a frame. Text is delivered verbatim; binary only when it is valid UTF-8.
pub fn classify_frame(frame: WsFrame) -> FrameDisposition {
    match frame {
        WsFrame::Text(bytes) | WsFrame::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => FrameDisposition::Payload(text),
            Err(_) => FrameDisposition::Skip,
        },
        WsFrame::Ping(_) | WsFrame::Pong(_) => FrameDisposition::Skip,
        WsFrame::Close(frame) => FrameDisposition::Closed(
            frame
                .as_ref()
                .map(WsCloseFrame::describe)
                .unwrap_or_else(|| "remote closed".to_string()),
        ),
    }
}
