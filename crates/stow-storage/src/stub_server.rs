//! Local HTTP/1.1 server standing in for S3 and STS endpoints in tests.
//!
//! Every request is handed to a closure and counted, so tests can assert on
//! both the mapped result and the number of requests the SDK sent.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use percent_encoding::percent_decode_str;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use url::Url;

/// Parsed request as seen by a handler.
#[derive(Debug)]
pub(crate) struct Request {
    pub method: String,
    /// Percent-decoded path.
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Splits a path-style request path into bucket and key.
    pub fn bucket_and_key(&self) -> (&str, &str) {
        let path = self.path.trim_start_matches('/');
        path.split_once('/').unwrap_or((path, ""))
    }
}

/// Response written back to the client.
#[derive(Debug, Clone)]
pub(crate) struct Response {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_owned(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn xml(self, body: impl Into<String>) -> Self {
        self.header("content-type", "application/xml").body(body.into())
    }

    /// S3 REST error document.
    pub fn s3_error(status: u16, code: &str) -> Self {
        Self::new(status).xml(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Error><Code>{code}</Code><Message>{code}</Message>\
             <RequestId>stub</RequestId></Error>"
        ))
    }

    /// STS query-protocol error document.
    pub fn sts_error(status: u16, code: &str) -> Self {
        Self::new(status).xml(format!(
            "<ErrorResponse xmlns=\"https://sts.amazonaws.com/doc/2011-06-15/\">\
             <Error><Type>Receiver</Type><Code>{code}</Code><Message>{code}</Message></Error>\
             <RequestId>stub</RequestId></ErrorResponse>"
        ))
    }

    fn encode(&self, head_only: bool) -> Vec<u8> {
        let reason = if self.status < 400 { "OK" } else { "Error" };
        let mut head = format!("HTTP/1.1 {} {reason}\r\n", self.status);
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }

        let has_length = self
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-length"));
        if !has_length && self.status != 204 {
            head.push_str(&format!("content-length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        if !head_only {
            bytes.extend_from_slice(&self.body);
        }
        bytes
    }
}

/// Running server; the accept loop stops when this is dropped.
pub(crate) struct StubServer {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl StubServer {
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(Request) -> Response + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let addr = listener.local_addr().expect("stub server address");

        let requests = Arc::new(AtomicUsize::new(0));
        let counter = requests.clone();
        let handler = Arc::new(handler);

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler.as_ref(), &counter).await;
                });
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn endpoint(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("stub endpoint")
    }

    /// Number of requests received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<H>(stream: TcpStream, handler: &H, counter: &AtomicUsize) -> io::Result<()>
where
    H: Fn(Request) -> Response,
{
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    while let Some(request) = read_request(&mut reader, &mut write).await? {
        counter.fetch_add(1, Ordering::SeqCst);
        let head_only = request.method == "HEAD";
        let response = handler(request);
        write.write_all(&response.encode(head_only)).await?;
        write.flush().await?;
    }

    Ok(())
}

async fn read_request<R, W>(reader: &mut R, writer: &mut W) -> io::Result<Option<Request>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }

    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let target = parts.next().unwrap_or("/").to_owned();

    let mut headers = BTreeMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
        }
    }

    let has = |name: &str, needle: &str| {
        headers
            .get(name)
            .is_some_and(|value: &String| value.to_ascii_lowercase().contains(needle))
    };

    if has("expect", "100-continue") {
        writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
    }

    let mut body = if has("transfer-encoding", "chunked") {
        read_chunked(reader).await?
    } else {
        let len = headers
            .get("content-length")
            .and_then(|len| len.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; len];
        reader.read_exact(&mut body).await?;
        body
    };

    if has("content-encoding", "aws-chunked") {
        let decoded = read_chunked(&mut body.as_slice()).await?;
        body = decoded;
    }

    let (path, query) = target.split_once('?').unwrap_or((target.as_str(), ""));
    let query = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(name), decode(value))
        })
        .collect();

    Ok(Some(Request {
        method,
        path: decode(path),
        query,
        headers,
        body,
    }))
}

/// Reads a chunked body, discarding chunk extensions and trailers.
async fn read_chunked<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        let size = line.trim().split(';').next().unwrap_or_default();
        let size = usize::from_str_radix(size, 16)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        if size == 0 {
            loop {
                let mut trailer = String::new();
                if reader.read_line(&mut trailer).await? == 0 || trailer.trim().is_empty() {
                    return Ok(body);
                }
            }
        }

        let start = body.len();
        body.resize(start + size, 0);
        reader.read_exact(&mut body[start..]).await?;

        let mut crlf = String::new();
        reader.read_line(&mut crlf).await?;
    }
}

fn decode(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}
