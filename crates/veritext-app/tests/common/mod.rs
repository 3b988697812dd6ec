//! Shared fixtures and scripted transports for app integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use veritext_upload::{
    DocumentUploadRequest, ProjectUploadRequest, RestError, RestResponse, RestTransport,
    StreamError, StreamFrame, StreamTransport,
};

/// Scripted frame-level transport for driver tests.
///
/// Outbound frames are recorded; inbound frames are replayed from a script.
/// With `block_when_empty` set, an exhausted script parks the receiver
/// instead of reporting a closed peer, which lets cancellation tests win the
/// race deterministically.
pub struct ScriptedTransport {
    pub inbound: VecDeque<StreamFrame>,
    pub sent: Vec<StreamFrame>,
    pub connected: bool,
    pub closed: bool,
    pub fail_connect: bool,
    pub block_when_empty: bool,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(inbound: Vec<StreamFrame>) -> Self {
        Self {
            inbound: inbound.into(),
            sent: Vec::new(),
            connected: false,
            closed: false,
            fail_connect: false,
            block_when_empty: false,
        }
    }

    pub fn blocking_when_empty(mut self) -> Self {
        self.block_when_empty = true;
        self
    }

    pub fn failing_connect() -> Self {
        let mut transport = Self::new(Vec::new());
        transport.fail_connect = true;
        transport
    }

    pub fn text_frames(&self) -> Vec<&str> {
        self.sent
            .iter()
            .filter_map(|frame| match frame {
                StreamFrame::Text(text) => Some(text.as_str()),
                StreamFrame::Binary(_) => None,
            })
            .collect()
    }

    pub fn binary_lens(&self) -> Vec<usize> {
        self.sent
            .iter()
            .filter_map(|frame| match frame {
                StreamFrame::Binary(bytes) => Some(bytes.len()),
                StreamFrame::Text(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<(), StreamError> {
        if self.fail_connect {
            return Err(StreamError::Connect("scripted connect failure".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<(), StreamError> {
        if !self.connected {
            return Err(StreamError::NotConnected);
        }
        self.sent.push(StreamFrame::Text(text.to_string()));
        Ok(())
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), StreamError> {
        if !self.connected {
            return Err(StreamError::NotConnected);
        }
        self.sent.push(StreamFrame::Binary(bytes));
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<Option<StreamFrame>, StreamError> {
        match self.inbound.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.block_when_empty => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.closed = true;
        Ok(())
    }
}

/// Scripted REST transport that replays a response script and counts calls.
pub struct ScriptedRestTransport {
    pub script: Mutex<VecDeque<Result<RestResponse, RestError>>>,
    pub calls: Mutex<u32>,
}

#[allow(dead_code)]
impl ScriptedRestTransport {
    pub fn new(script: Vec<Result<RestResponse, RestError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().expect("call counter lock should work")
    }

    fn next_response(&self) -> Result<RestResponse, RestError> {
        let mut calls = self.calls.lock().expect("call counter lock should work");
        *calls += 1;

        self.script
            .lock()
            .expect("script lock should work")
            .pop_front()
            .unwrap_or_else(|| {
                Ok(RestResponse {
                    status: 200,
                    body: "{}".to_string(),
                })
            })
    }
}

#[async_trait]
impl RestTransport for ScriptedRestTransport {
    async fn post_project(
        &self,
        _endpoint: &str,
        _token: &str,
        _request: &ProjectUploadRequest,
    ) -> Result<RestResponse, RestError> {
        self.next_response()
    }

    async fn post_analyze(
        &self,
        _endpoint: &str,
        _token: &str,
        _request: &DocumentUploadRequest,
    ) -> Result<RestResponse, RestError> {
        self.next_response()
    }
}

/// JSON text frame for one classification event.
#[allow(dead_code)]
pub fn classification_frame(page: u32, chunk: u32, text: &str, category: u32) -> StreamFrame {
    StreamFrame::Text(format!(
        r#"{{"page":{page},"chunk":{chunk},"text":"{text}","data":{{"input":"{text}","result":{category}}}}}"#
    ))
}

/// JSON text frame for a page completion.
#[allow(dead_code)]
pub fn page_completed_frame(page: u32) -> StreamFrame {
    StreamFrame::Text(format!(r#"{{"page":{page},"status":"completed"}}"#))
}

/// JSON text frame for the document-done message.
#[allow(dead_code)]
pub fn done_frame() -> StreamFrame {
    StreamFrame::Text(r#"{"status":"done"}"#.to_string())
}

/// JSON text frame for the page-count hint.
#[allow(dead_code)]
pub fn page_count_frame(total_pages: u32) -> StreamFrame {
    StreamFrame::Text(format!(r#"{{"total pages":{total_pages}}}"#))
}

/// JSON text frame for one upload progress report.
#[allow(dead_code)]
pub fn upload_progress_frame(status: &str, progress: f64) -> StreamFrame {
    StreamFrame::Text(format!(
        r#"{{"status":"{status}","progress":{progress}}}"#
    ))
}

/// Canonical project-created REST body.
#[allow(dead_code)]
pub fn project_created_body() -> String {
    r#"{
        "message": "Project uploaded, extracted, and analyzed successfully",
        "project_name": "thesis",
        "extracted_size_bytes": 2097152,
        "extracted_size_mb": "2.00 MB"
    }"#
    .to_string()
}
