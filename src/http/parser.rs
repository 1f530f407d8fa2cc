//! Byte-to-record HTTP parsing.
//!
//! Pure functions over a buffer iterator: nothing is consumed here.
//! The caller checks the outcome and, only on [`Parse::Complete`],
//! consumes the iterator's `bytes_read` from the buffer — so a request
//! that is still missing bytes leaves the stream untouched for the
//! next read to extend.

use super::request::Request;
use super::response::Response;
use crate::buffer::Iter;

use thiserror::Error;

/// Outcome of a parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parse {
    /// A full record was parsed; consume `bytes_read`.
    Complete,

    /// The input ends mid-record; try again with more bytes.
    Incomplete,

    /// The input cannot be a valid record.
    Malformed,
}

#[derive(Debug, Error)]
enum ParseError {
    #[error("need more input")]
    Incomplete,

    #[error("malformed input")]
    Malformed,
}

type ParseResult<T> = Result<T, ParseError>;

/// Parses one request: `METHOD SP "/" ADDRESS SP VERSION CRLF`, then
/// header lines up to an empty line. Headers are skipped over, not
/// retained.
pub fn parse_request(input: &mut Iter<'_>, request: &mut Request) -> Parse {
    request.clear();
    outcome(try_parse_request(input, request))
}

/// Parses one response: status line, header lines (of which
/// `Content-Length` is honored), then exactly that many body bytes.
pub fn parse_response(input: &mut Iter<'_>, response: &mut Response) -> Parse {
    response.clear();
    outcome(try_parse_response(input, response))
}

fn outcome(result: ParseResult<()>) -> Parse {
    match result {
        Ok(()) => Parse::Complete,
        Err(ParseError::Incomplete) => Parse::Incomplete,
        Err(ParseError::Malformed) => Parse::Malformed,
    }
}

fn try_parse_request(input: &mut Iter<'_>, request: &mut Request) -> ParseResult<()> {
    parse_token(input, &mut request.method)?;
    skip_byte(input, b' ')?;
    skip_byte(input, b'/')?;
    parse_token(input, &mut request.address)?;
    skip_byte(input, b' ')?;
    parse_token(input, &mut request.version)?;
    skip_newline(input)?;

    let mut line = String::new();
    loop {
        line.clear();
        parse_line(input, &mut line)?;
        if line.is_empty() {
            return Ok(());
        }
    }
}

fn try_parse_response(input: &mut Iter<'_>, response: &mut Response) -> ParseResult<()> {
    parse_line(input, &mut response.status_line)?;

    const LENGTH_HEADER: &str = "Content-Length:";

    let mut content_size = 0usize;
    loop {
        let mut line = String::new();
        parse_line(input, &mut line)?;

        if line.is_empty() {
            break;
        }

        if line.starts_with(LENGTH_HEADER) {
            content_size = line[LENGTH_HEADER.len()..].trim().parse().unwrap_or(0);
        }

        response.header_remainder.push_str(&line);
    }

    if input.bytes_total() - input.bytes_read() < content_size {
        return Err(ParseError::Incomplete);
    }

    for _ in 0..content_size {
        response.body.push(input.peek());
        input.next();
    }

    Ok(())
}

/// Accumulates bytes into `token` up to a space or carriage return.
/// The delimiter is left in the stream.
fn parse_token(input: &mut Iter<'_>, token: &mut String) -> ParseResult<()> {
    if input.eob() {
        return Err(ParseError::Incomplete);
    }

    while !input.eob() {
        let byte = input.peek();
        if byte == b' ' || byte == b'\r' {
            return Ok(());
        }
        token.push(byte as char);
        input.next();
    }

    // Ran off the end without seeing a delimiter; the token may have
    // more bytes coming.
    Err(ParseError::Incomplete)
}

/// Accumulates one CRLF-terminated line into `line` (CRLF excluded).
fn parse_line(input: &mut Iter<'_>, line: &mut String) -> ParseResult<()> {
    if input.eob() {
        return Err(ParseError::Incomplete);
    }

    while !input.eob() {
        let byte = input.peek();
        if byte == b'\r' {
            input.next();
            if input.eob() {
                return Err(ParseError::Incomplete);
            }
            if input.peek() == b'\n' {
                input.next();
                return Ok(());
            }
            return Err(ParseError::Malformed);
        }
        line.push(byte as char);
        input.next();
    }

    Err(ParseError::Incomplete)
}

/// Requires the next byte to be `expected` and steps over it.
fn skip_byte(input: &mut Iter<'_>, expected: u8) -> ParseResult<()> {
    if input.eob() {
        return Err(ParseError::Incomplete);
    }
    if input.peek() != expected {
        return Err(ParseError::Malformed);
    }
    input.next();
    Ok(())
}

/// Requires and steps over a CRLF pair.
fn skip_newline(input: &mut Iter<'_>) -> ParseResult<()> {
    if input.eob() {
        return Err(ParseError::Incomplete);
    }
    let first = input.peek();
    input.next();

    if input.eob() {
        return Err(ParseError::Incomplete);
    }
    let second = input.peek();

    if first != b'\r' || second != b'\n' {
        return Err(ParseError::Malformed);
    }
    input.next();
    Ok(())
}
