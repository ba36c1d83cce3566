//! `ttsctl`: a thin REPL client for the TTS wire protocol (spec.md §6).
//!
//! This mirrors the external-collaborator CLI tool the core spec treats as
//! out of scope: it tokenizes one line of input into a `tts::protocol::Packet`,
//! sends it framed over the connection, reads back exactly one framed
//! response, and prints it. None of this is covered by the engine's
//! testable properties (spec.md §8) — only the wire format it emits and
//! parses is, and that's exercised by `tts`'s own round-trip tests.

use std::io::{self, BufRead, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, ValueEnum};
use console::style;

use tts::protocol::{
    self, Ack, AddPoints, CreateTs, DeleteTs, Header, Opcode, Packet, Point, Query, QueryResponse, Status,
};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 19191;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Inet,
    Unix,
}

/// A REPL client for the TTS wire protocol.
#[derive(Parser, Debug)]
#[command(name = "ttsctl", about = "A REPL client for the TTS wire protocol.")]
struct Args {
    /// Server address (inet mode) or socket path (unix mode).
    #[arg(short = 'a', long = "address")]
    address: Option<String>,

    /// Server port (inet mode only).
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// Transport mode.
    #[arg(short = 'm', long = "mode", value_enum, default_value = "inet")]
    mode: Mode,
}

/// Either connected socket kind, unified so the REPL loop doesn't care which
/// mode it dialed. Mirrors `tts::server`'s `Stream` enum on the client side.
enum Conn {
    Inet(TcpStream),
    Unix(UnixStream),
}

impl Read for Conn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Conn::Inet(s) => s.read(buf),
            Conn::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Conn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Conn::Inet(s) => s.write(buf),
            Conn::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Conn::Inet(s) => s.flush(),
            Conn::Unix(s) => s.flush(),
        }
    }
}

impl Conn {
    fn dial(args: &Args) -> anyhow::Result<Self> {
        match args.mode {
            Mode::Unix => {
                let path = args.address.as_deref().ok_or_else(|| anyhow!("-a <socket path> is required in unix mode"))?;
                Ok(Conn::Unix(UnixStream::connect(path).with_context(|| format!("connecting to {path}"))?))
            }
            Mode::Inet => {
                let host = args.address.as_deref().unwrap_or(DEFAULT_HOST);
                let port = args.port.unwrap_or(DEFAULT_PORT);
                let addr = (host, port)
                    .to_socket_addrs()
                    .with_context(|| format!("resolving {host}:{port}"))?
                    .next()
                    .ok_or_else(|| anyhow!("no addresses found for {host}:{port}"))?;
                Ok(Conn::Inet(TcpStream::connect(addr).with_context(|| format!("connecting to {addr}"))?))
            }
        }
    }

    /// Sends one framed request and blocks for exactly one framed response,
    /// per the request/response discipline spec.md §5 describes (strict
    /// per-connection ordering, one response per request).
    fn roundtrip(&mut self, header: Header, packet: &Packet) -> anyhow::Result<(Header, Packet)> {
        let mut buf = Vec::new();
        protocol::encode_frame(header, packet, &mut buf)?;
        self.write_all(&buf).context("writing request")?;

        let mut prefix = [0u8; 5];
        self.read_exact(&mut prefix).context("reading response header")?;
        let resp_header = Header::from_byte(prefix[0]);
        let body_len = u32::from_be_bytes(prefix[1..5].try_into().unwrap());

        let mut body = vec![0u8; body_len as usize];
        self.read_exact(&mut body).context("reading response body")?;

        let opcode = resp_header.opcode()?;
        let resp_packet = Packet::decode(opcode, &body)?;
        Ok((resp_header, resp_packet))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut conn = Conn::dial(&args)?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            break;
        }

        let outcome = parse_line(trimmed).and_then(|(header, packet)| conn.roundtrip(header, &packet));
        match outcome {
            Ok((resp_header, resp_packet)) => print_response(resp_header, &resp_packet),
            Err(e) => eprintln!("{} {e:#}", style("error:").red().bold()),
        }
    }

    Ok(())
}

fn print_response(header: Header, packet: &Packet) {
    let status = header.status().unwrap_or(Status::Ok);
    match packet {
        Packet::QueryResponse(QueryResponse { results }) => {
            println!("{} ({} result(s))", style(format!("{status:?}")).cyan(), results.len());
            for r in results {
                let labels: Vec<String> = r.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
                println!("  {}.{:09} = {}  [{}]", r.ts_sec, r.ts_nsec, r.value, labels.join(", "));
            }
        }
        Packet::Ack(Ack) => {
            println!("{}", style(format!("{status:?}")).cyan());
        }
        other => println!("{other:?}"),
    }
}

/// Tokenizes one REPL line into a `(Header, Packet)` request, per the
/// grammar in spec.md §6.
fn parse_line(line: &str) -> anyhow::Result<(Header, Packet)> {
    let mut tokens = line.split_whitespace();
    let cmd = tokens.next().ok_or_else(|| anyhow!("empty command"))?;

    match cmd.to_ascii_uppercase().as_str() {
        "CREATE" => parse_create(tokens),
        "DELETE" => parse_delete(tokens),
        "ADD" => parse_add(tokens),
        "QUERY" => parse_query(tokens),
        other => bail!("unknown command {other:?}"),
    }
}

fn parse_create<'a>(mut tokens: impl Iterator<Item = &'a str>) -> anyhow::Result<(Header, Packet)> {
    let name = tokens.next().ok_or_else(|| anyhow!("CREATE requires a series name"))?.to_string();
    let retention_secs: u32 = match tokens.next() {
        Some(s) => s.parse().context("CREATE retention must be an integer number of seconds")?,
        None => 0,
    };
    // Retention is converted to retention*1e6 before transmission, per
    // spec.md §6 (units left ambiguous server-side; see DESIGN.md).
    let retention = retention_secs.saturating_mul(1_000_000);
    Ok((Header::request(Opcode::CreateTs), Packet::CreateTs(CreateTs { name, retention })))
}

fn parse_delete<'a>(mut tokens: impl Iterator<Item = &'a str>) -> anyhow::Result<(Header, Packet)> {
    let name = tokens.next().ok_or_else(|| anyhow!("DELETE requires a series name"))?.to_string();
    Ok((Header::request(Opcode::DeleteTs), Packet::DeleteTs(DeleteTs { name })))
}

fn parse_add<'a>(mut tokens: impl Iterator<Item = &'a str>) -> anyhow::Result<(Header, Packet)> {
    let name = tokens.next().ok_or_else(|| anyhow!("ADD requires a series name"))?.to_string();
    let rest: Vec<&str> = tokens.collect();

    let mut points = Vec::new();
    for group in rest.split(|t| *t == "-") {
        if group.is_empty() {
            continue;
        }
        points.push(parse_point(group)?);
    }
    if points.is_empty() {
        bail!("ADD requires at least one point");
    }

    Ok((Header::request(Opcode::AddPoints), Packet::AddPoints(AddPoints { name, points })))
}

fn parse_point(tokens: &[&str]) -> anyhow::Result<Point> {
    let (ts_tok, rest) = tokens.split_first().ok_or_else(|| anyhow!("point requires a timestamp"))?;
    let (value_tok, label_toks) = rest.split_first().ok_or_else(|| anyhow!("point requires a value"))?;

    let (ts_sec, ts_nsec) = if *ts_tok == "*" {
        (None, None)
    } else {
        let sec = parse_add_timestamp(ts_tok)?;
        (Some(sec), Some(0))
    };

    let value: f64 = value_tok.parse().with_context(|| format!("invalid point value {value_tok:?}"))?;

    if label_toks.len() % 2 != 0 {
        bail!("labels must come in name/value pairs");
    }
    let labels = label_toks
        .chunks(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect();

    Ok(Point { ts_sec, ts_nsec, value, labels })
}

/// Parses an `ADD` timestamp token into whole seconds: 10-digit values are
/// seconds as-is; 13-digit values are milliseconds, divided down to
/// seconds (per spec.md §6's literal rule — sub-second precision is
/// dropped, not rounded into `ts_nsec`).
fn parse_add_timestamp(tok: &str) -> anyhow::Result<u64> {
    let digits = tok.len();
    let raw: u64 = tok.parse().with_context(|| format!("invalid timestamp {tok:?}"))?;
    match digits {
        10 => Ok(raw),
        13 => Ok(raw / 1000),
        _ => bail!("timestamp {tok:?} must be '*', 10 digits (seconds), or 13 digits (milliseconds)"),
    }
}

/// Normalizes a `QUERY` timestamp bound: values of 10 digits or fewer are
/// assumed to be seconds and scaled to nanoseconds, per spec.md §6.
fn parse_query_timestamp(tok: &str) -> anyhow::Result<u64> {
    let raw: u64 = tok.parse().with_context(|| format!("invalid timestamp {tok:?}"))?;
    if tok.len() <= 10 {
        Ok(raw.saturating_mul(1_000_000_000))
    } else {
        Ok(raw)
    }
}

fn parse_query<'a>(mut tokens: impl Iterator<Item = &'a str>) -> anyhow::Result<(Header, Packet)> {
    let name = tokens.next().ok_or_else(|| anyhow!("QUERY requires a series name"))?.to_string();

    let mut first = false;
    let mut last = false;
    let mut major_of = None;
    let mut minor_of = None;
    let mut mean_val = None;

    let tokens: Vec<&str> = tokens.collect();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].to_ascii_uppercase().as_str() {
            "*" => i += 1,
            ">" => {
                let t = tokens.get(i + 1).ok_or_else(|| anyhow!("'>' requires a timestamp"))?;
                major_of = Some(parse_query_timestamp(t)?);
                i += 2;
            }
            "<" => {
                let t = tokens.get(i + 1).ok_or_else(|| anyhow!("'<' requires a timestamp"))?;
                minor_of = Some(parse_query_timestamp(t)?);
                i += 2;
            }
            "RANGE" => {
                let t1 = tokens.get(i + 1).ok_or_else(|| anyhow!("RANGE requires two timestamps"))?;
                let t2 = tokens.get(i + 2).ok_or_else(|| anyhow!("RANGE requires two timestamps"))?;
                major_of = Some(parse_query_timestamp(t1)?);
                minor_of = Some(parse_query_timestamp(t2)?);
                i += 3;
            }
            "FIRST" => {
                first = true;
                i += 1;
            }
            "LAST" => {
                last = true;
                i += 1;
            }
            "AVG" => {
                let w = tokens.get(i + 1).ok_or_else(|| anyhow!("AVG requires a window in milliseconds"))?;
                mean_val = Some(w.parse().with_context(|| format!("invalid AVG window {w:?}"))?);
                i += 2;
            }
            other => bail!("unrecognized QUERY token {other:?}"),
        }
    }

    Ok((
        Header::request(Opcode::Query),
        Packet::Query(Query { name, mean_val, first, last, major_of, minor_of }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_with_retention_converts_seconds_to_wire_units() {
        let (header, packet) = parse_line("CREATE metrics 3600").unwrap();
        assert_eq!(header.opcode().unwrap(), Opcode::CreateTs);
        match packet {
            Packet::CreateTs(req) => {
                assert_eq!(req.name, "metrics");
                assert_eq!(req.retention, 3_600_000_000);
            }
            _ => panic!("expected CreateTs"),
        }
    }

    #[test]
    fn create_without_retention_defaults_to_zero() {
        let (_, packet) = parse_line("CREATE metrics").unwrap();
        match packet {
            Packet::CreateTs(req) => assert_eq!(req.retention, 0),
            _ => panic!("expected CreateTs"),
        }
    }

    #[test]
    fn delete_parses_name() {
        let (header, packet) = parse_line("DELETE metrics").unwrap();
        assert_eq!(header.opcode().unwrap(), Opcode::DeleteTs);
        assert_eq!(packet, Packet::DeleteTs(DeleteTs { name: "metrics".into() }));
    }

    #[test]
    fn add_single_point_with_wildcard_timestamp() {
        let (_, packet) = parse_line("ADD cpu * 0.4").unwrap();
        match packet {
            Packet::AddPoints(req) => {
                assert_eq!(req.points.len(), 1);
                assert!(req.points[0].ts_sec.is_none());
                assert_eq!(req.points[0].value, 0.4);
            }
            _ => panic!("expected AddPoints"),
        }
    }

    #[test]
    fn add_point_with_seconds_timestamp_and_labels() {
        let (_, packet) = parse_line("ADD temp 1700000000 21.5 room kitchen").unwrap();
        match packet {
            Packet::AddPoints(req) => {
                assert_eq!(req.points[0].ts_sec, Some(1_700_000_000));
                assert_eq!(req.points[0].ts_nsec, Some(0));
                assert_eq!(req.points[0].labels, vec![("room".to_string(), "kitchen".to_string())]);
            }
            _ => panic!("expected AddPoints"),
        }
    }

    #[test]
    fn add_multiple_points_separated_by_dash() {
        let (_, packet) = parse_line("ADD ts 1000000000 1 - 2000000000 2 - 3000000000 3").unwrap();
        match packet {
            Packet::AddPoints(req) => assert_eq!(req.points.len(), 3),
            _ => panic!("expected AddPoints"),
        }
    }

    #[test]
    fn add_millisecond_timestamp_is_divided_down_to_seconds() {
        let (_, packet) = parse_line("ADD t 1700000000123 1").unwrap();
        match packet {
            Packet::AddPoints(req) => assert_eq!(req.points[0].ts_sec, Some(1_700_000_000)),
            _ => panic!("expected AddPoints"),
        }
    }

    #[test]
    fn query_wildcard_is_a_full_scan() {
        let (_, packet) = parse_line("QUERY temp *").unwrap();
        match packet {
            Packet::Query(q) => {
                assert!(!q.first && !q.last && q.mean_val.is_none() && q.major_of.is_none() && q.minor_of.is_none())
            }
            _ => panic!("expected Query"),
        }
    }

    #[test]
    fn query_range_normalizes_short_timestamps_to_nanoseconds() {
        let (_, packet) = parse_line("QUERY ts RANGE 1500000000 2500000000").unwrap();
        match packet {
            Packet::Query(q) => {
                assert_eq!(q.major_of, Some(1_500_000_000_000_000_000));
                assert_eq!(q.minor_of, Some(2_500_000_000_000_000_000));
            }
            _ => panic!("expected Query"),
        }
    }

    #[test]
    fn query_avg_combines_with_range() {
        let (_, packet) = parse_line("QUERY cpu RANGE 1 100 AVG 60000").unwrap();
        match packet {
            Packet::Query(q) => {
                assert_eq!(q.mean_val, Some(60_000));
                assert!(q.major_of.is_some() && q.minor_of.is_some());
            }
            _ => panic!("expected Query"),
        }
    }

    #[test]
    fn query_first_and_last() {
        let (_, first) = parse_line("QUERY t FIRST").unwrap();
        assert!(matches!(first, Packet::Query(Query { first: true, .. })));
        let (_, last) = parse_line("QUERY t LAST").unwrap();
        assert!(matches!(last, Packet::Query(Query { last: true, .. })));
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(parse_line("FROBNICATE x").is_err());
    }
}
