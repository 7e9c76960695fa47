//! HTTP span parsing.
//!
//! Locates HTTP/1.x messages in a [`Transcript`] and records the byte ranges
//! of their parts, which are then used to commit to and disclose individual
//! lines of a request or response.

use std::ops::Range;

use httparse::Status;

use crate::transcript::Transcript;

/// Maximum number of headers parsed per message.
const MAX_HEADERS: usize = 64;

/// Error for [`HttpTranscript::parse`].
#[derive(Debug, thiserror::Error)]
#[error("http parse error: {0}")]
pub struct HttpParseError(String);

impl HttpParseError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// HTTP header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Range of the whole header line, including the line terminator.
    pub span: Range<usize>,
    /// Header name as it appears on the wire.
    pub name: String,
    /// Range of the header name.
    pub name_span: Range<usize>,
    /// Range of the header value.
    pub value_span: Range<usize>,
}

/// HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Range of the entire request.
    pub span: Range<usize>,
    /// Range of the request line, including the line terminator.
    pub request_line: Range<usize>,
    /// Request method.
    pub method: String,
    /// Request target.
    pub target: String,
    /// Range of the request target.
    pub target_span: Range<usize>,
    /// Request headers.
    pub headers: Vec<Header>,
    /// Range of the request body, if any.
    pub body: Option<Range<usize>>,
}

/// HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Range of the entire response.
    pub span: Range<usize>,
    /// Range of the status line, including the line terminator.
    pub status_line: Range<usize>,
    /// Status code.
    pub code: u16,
    /// Response headers.
    pub headers: Vec<Header>,
    /// Range of the response body, if any.
    pub body: Option<Range<usize>>,
}

impl Request {
    /// Returns the first header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&Header> {
        find_header(&self.headers, name)
    }
}

impl Response {
    /// Returns the first header with the given name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&Header> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a Header> {
    headers
        .iter()
        .find(|header| header.name.eq_ignore_ascii_case(name))
}

/// The HTTP messages of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTranscript {
    /// Requests sent by the Prover.
    pub requests: Vec<Request>,
    /// Responses received from the Server.
    pub responses: Vec<Response>,
}

impl HttpTranscript {
    /// Parses the requests in the sent data and the responses in the received
    /// data.
    pub fn parse(transcript: &Transcript) -> Result<Self, HttpParseError> {
        let requests = parse_requests(transcript.sent())?;

        let methods = requests
            .iter()
            .map(|request| request.method.as_str())
            .collect::<Vec<_>>();
        let responses = parse_responses(transcript.received(), &methods)?;

        Ok(Self {
            requests,
            responses,
        })
    }
}

/// Parses all requests in `data`.
pub fn parse_requests(data: &[u8]) -> Result<Vec<Request>, HttpParseError> {
    let mut requests = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let request = parse_request(data, offset)?;
        offset = request.span.end;
        requests.push(request);
    }

    Ok(requests)
}

fn parse_request(data: &[u8], offset: usize) -> Result<Request, HttpParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    let head_len = match request.parse(&data[offset..]) {
        Ok(Status::Complete(len)) => len,
        Ok(Status::Partial) => {
            return Err(HttpParseError::new(format!(
                "incomplete request at offset {offset}"
            )))
        }
        Err(err) => {
            return Err(HttpParseError::new(format!(
                "invalid request at offset {offset}: {err}"
            )))
        }
    };

    let (Some(method), Some(path)) = (request.method, request.path) else {
        return Err(HttpParseError::new("request line is incomplete"));
    };

    let target_start = offset_of(data, path.as_bytes());
    let headers = collect_headers(data, request.headers);
    let request_line = offset..line_end(data, offset);

    let body_start = offset + head_len;
    let body_end = if is_chunked(data, &headers) {
        chunked_end(data, body_start)?
    } else if let Some(len) = content_length(data, &headers)? {
        body_start + len
    } else {
        body_start
    };

    if body_end > data.len() {
        return Err(HttpParseError::new("request body is truncated"));
    }

    Ok(Request {
        span: offset..body_end,
        request_line,
        method: method.to_string(),
        target: path.to_string(),
        target_span: target_start..target_start + path.len(),
        headers,
        body: (body_end > body_start).then_some(body_start..body_end),
    })
}

/// Parses all responses in `data`.
///
/// `methods` are the methods of the corresponding requests, used to detect
/// responses to `HEAD` requests which never carry a body.
pub fn parse_responses(data: &[u8], methods: &[&str]) -> Result<Vec<Response>, HttpParseError> {
    let mut responses = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let head = methods
            .get(responses.len())
            .is_some_and(|method| method.eq_ignore_ascii_case("HEAD"));
        let response = parse_response(data, offset, head)?;
        offset = response.span.end;
        responses.push(response);
    }

    Ok(responses)
}

fn parse_response(data: &[u8], offset: usize, head: bool) -> Result<Response, HttpParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);

    let head_len = match response.parse(&data[offset..]) {
        Ok(Status::Complete(len)) => len,
        Ok(Status::Partial) => {
            return Err(HttpParseError::new(format!(
                "incomplete response at offset {offset}"
            )))
        }
        Err(err) => {
            return Err(HttpParseError::new(format!(
                "invalid response at offset {offset}: {err}"
            )))
        }
    };

    let code = response
        .code
        .ok_or_else(|| HttpParseError::new("status line is incomplete"))?;
    let headers = collect_headers(data, response.headers);
    let status_line = offset..line_end(data, offset);

    let body_start = offset + head_len;
    let body_end = if head || (100..200).contains(&code) || code == 204 || code == 304 {
        body_start
    } else if is_chunked(data, &headers) {
        chunked_end(data, body_start)?
    } else if let Some(len) = content_length(data, &headers)? {
        body_start + len
    } else {
        // Delimited by the connection closing.
        data.len()
    };

    if body_end > data.len() {
        return Err(HttpParseError::new("response body is truncated"));
    }

    Ok(Response {
        span: offset..body_end,
        status_line,
        code,
        headers,
        body: (body_end > body_start).then_some(body_start..body_end),
    })
}

fn collect_headers(data: &[u8], headers: &[httparse::Header<'_>]) -> Vec<Header> {
    headers
        .iter()
        .map(|header| {
            let name_start = offset_of(data, header.name.as_bytes());
            let value_start = offset_of(data, header.value);
            let value_end = value_start + header.value.len();

            Header {
                span: name_start..line_end(data, value_end),
                name: header.name.to_string(),
                name_span: name_start..name_start + header.name.len(),
                value_span: value_start..value_end,
            }
        })
        .collect()
}

fn is_chunked(data: &[u8], headers: &[Header]) -> bool {
    find_header(headers, "transfer-encoding").is_some_and(|header| {
        data[header.value_span.clone()]
            .split(|b| *b == b',')
            .any(|coding| coding.trim_ascii().eq_ignore_ascii_case(b"chunked"))
    })
}

fn content_length(data: &[u8], headers: &[Header]) -> Result<Option<usize>, HttpParseError> {
    let Some(header) = find_header(headers, "content-length") else {
        return Ok(None);
    };

    std::str::from_utf8(&data[header.value_span.clone()])
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .map(Some)
        .ok_or_else(|| HttpParseError::new("invalid content-length"))
}

/// Returns the end of a chunked body starting at `offset`.
fn chunked_end(data: &[u8], mut offset: usize) -> Result<usize, HttpParseError> {
    loop {
        let (consumed, size) = match httparse::parse_chunk_size(data.get(offset..).unwrap_or(&[])) {
            Ok(Status::Complete((consumed, size))) => (consumed, size),
            Ok(Status::Partial) => return Err(HttpParseError::new("chunked body is truncated")),
            Err(_) => return Err(HttpParseError::new("invalid chunk size")),
        };
        offset += consumed;

        if size == 0 {
            break;
        }

        let size = usize::try_from(size).map_err(|_| HttpParseError::new("chunk too large"))?;
        offset = offset
            .checked_add(size)
            .filter(|end| end + 2 <= data.len())
            .ok_or_else(|| HttpParseError::new("chunked body is truncated"))?;

        if &data[offset..offset + 2] != b"\r\n" {
            return Err(HttpParseError::new("chunk is not terminated by CRLF"));
        }
        offset += 2;
    }

    // Trailer section, terminated by an empty line.
    loop {
        let end = data[offset..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map(|pos| offset + pos + 2)
            .ok_or_else(|| HttpParseError::new("chunked trailer is truncated"))?;

        let empty = end - offset == 2;
        offset = end;

        if empty {
            return Ok(offset);
        }
    }
}

/// Returns the end of the line containing `offset`, including the terminator.
fn line_end(data: &[u8], offset: usize) -> usize {
    data[offset..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|pos| offset + pos + 1)
        .unwrap_or(data.len())
}

/// Returns the offset of `part` within `whole`.
///
/// `part` must be a subslice of `whole`.
fn offset_of(whole: &[u8], part: &[u8]) -> usize {
    let offset = (part.as_ptr() as usize).wrapping_sub(whole.as_ptr() as usize);
    debug_assert!(offset + part.len() <= whole.len(), "part is not a part of whole");
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    const REQUEST: &[u8] = b"GET /home.html HTTP/1.1\r\n\
        Host: developer.mozilla.org\r\n\
        Cookie: session=secret\r\n\
        Content-Length: 12\r\n\r\n\
        Hello World!";

    const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
        Date: Mon, 27 Jul 2009 12:28:53 GMT\r\n\
        Content-Length: 5\r\n\
        Content-Type: text/plain\r\n\r\n\
        hello";

    const CHUNKED: &[u8] = b"HTTP/1.1 200 OK\r\n\
        Transfer-Encoding: chunked\r\n\r\n\
        5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";

    fn at<'a>(data: &'a [u8], range: &Range<usize>) -> &'a [u8] {
        &data[range.clone()]
    }

    #[test]
    fn test_parse_request() {
        let requests = parse_requests(REQUEST).unwrap();
        assert_eq!(requests.len(), 1);

        let request = &requests[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "/home.html");
        assert_eq!(at(REQUEST, &request.target_span), b"/home.html");
        assert_eq!(at(REQUEST, &request.request_line), b"GET /home.html HTTP/1.1\r\n");
        assert_eq!(request.headers.len(), 3);

        let host = request.header("host").unwrap();
        assert_eq!(at(REQUEST, &host.value_span), b"developer.mozilla.org");
        assert_eq!(at(REQUEST, &host.span), b"Host: developer.mozilla.org\r\n");

        assert_eq!(at(REQUEST, request.body.as_ref().unwrap()), b"Hello World!");
        assert_eq!(request.span, 0..REQUEST.len());
    }

    #[test]
    fn test_parse_response() {
        let responses = parse_responses(RESPONSE, &["GET"]).unwrap();
        let response = &responses[0];

        assert_eq!(response.code, 200);
        assert_eq!(at(RESPONSE, &response.status_line), b"HTTP/1.1 200 OK\r\n");
        assert_eq!(
            at(RESPONSE, &response.header("content-type").unwrap().value_span),
            b"text/plain"
        );
        assert_eq!(at(RESPONSE, response.body.as_ref().unwrap()), b"hello");
    }

    #[test]
    fn test_parse_chunked() {
        let responses = parse_responses(CHUNKED, &[]).unwrap();
        let response = &responses[0];

        assert_eq!(response.span, 0..CHUNKED.len());
        assert!(at(CHUNKED, response.body.as_ref().unwrap()).starts_with(b"5\r\nhello"));
    }

    #[test]
    fn test_parse_read_until_close() {
        let data = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\nall of it";
        let responses = parse_responses(data, &["GET"]).unwrap();

        assert_eq!(at(data, responses[0].body.as_ref().unwrap()), b"all of it");
    }

    #[test]
    fn test_parse_head_response_has_no_body() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n";
        let responses = parse_responses(data, &["HEAD"]).unwrap();

        assert!(responses[0].body.is_none());
    }

    #[test]
    fn test_parse_pipelined() {
        let mut data = Vec::new();
        data.extend_from_slice(b"GET /a HTTP/1.1\r\nHost: a\r\n\r\n");
        data.extend_from_slice(b"GET /b HTTP/1.1\r\nHost: a\r\n\r\n");

        let requests = parse_requests(&data).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].target, "/b");
        assert_eq!(requests[1].span.start, requests[0].span.end);
    }

    #[rstest]
    #[case::partial_head(b"GET / HTTP/1.1\r\nHost: a\r\n".as_slice())]
    #[case::truncated_body(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc".as_slice())]
    #[case::garbage(b"\x00\x01\x02 nonsense\r\n\r\n".as_slice())]
    fn test_parse_request_invalid(#[case] data: &[u8]) {
        assert!(parse_requests(data).is_err());
    }

    #[rstest]
    #[case::truncated_chunk(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel".as_slice())]
    #[case::bad_length(b"HTTP/1.1 200 OK\r\nContent-Length: abc\r\n\r\n".as_slice())]
    fn test_parse_response_invalid(#[case] data: &[u8]) {
        assert!(parse_responses(data, &[]).is_err());
    }

    #[test]
    fn test_parse_transcript() {
        let transcript = Transcript::new(REQUEST, RESPONSE);
        let http = HttpTranscript::parse(&transcript).unwrap();

        assert_eq!(http.requests.len(), 1);
        assert_eq!(http.responses.len(), 1);
    }
}
