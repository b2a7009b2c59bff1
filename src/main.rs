use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use http::Method;
use tracing::Level;

use grab::{Body, BodyStream, BoxError, Fields, Grab, Headers, Options, Response, ResponseBody};

#[derive(Parser, Debug)]
#[clap(version, about = "Issue one HTTP request and print the response body")]
struct Args {
    #[clap(value_parser)]
    url: String,

    /// Request method
    #[clap(short = 'X', long, value_parser = parse_method, value_name = "METHOD")]
    method: Option<Method>,

    /// Request header as NAME:VALUE; repeat to add more
    #[clap(short = 'H', long = "header", value_parser = parse_header, value_name = "NAME:VALUE")]
    headers: Vec<(String, String)>,

    /// Request body
    #[clap(short = 'd', long, conflicts_with_all = ["data_file", "form"])]
    data: Option<String>,

    /// Stream the request body from a file
    #[clap(long, value_parser, conflicts_with = "form")]
    data_file: Option<PathBuf>,

    /// Multipart form field as KEY=VALUE; repeat a key to send several values
    #[clap(short = 'F', long, value_parser = parse_pair, value_name = "KEY=VALUE")]
    form: Vec<(String, String)>,

    /// Query parameter as KEY=VALUE; replaces the URL's query string
    #[clap(short = 'q', long, value_parser = parse_pair, value_name = "KEY=VALUE")]
    query: Vec<(String, String)>,

    /// Decode the response as JSON and pretty-print it
    #[clap(long)]
    json: bool,

    /// Return redirect responses instead of following them
    #[clap(long)]
    no_redirects: bool,

    #[clap(long, value_name = "N")]
    max_redirects: Option<usize>,

    /// Timeout in milliseconds for connecting and receiving the response head
    #[clap(long, value_name = "MS")]
    timeout: Option<u64>,

    /// Print the status line and response headers before the body
    #[clap(short, long)]
    include: bool,

    /// Log pipeline activity to stderr; repeat for more detail
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_bytes(s.to_ascii_uppercase().as_bytes()).map_err(|e| e.to_string())
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got {:?}", s))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {:?}", s))?;
    Ok((key.to_string(), value.to_string()))
}

fn fields(pairs: &[(String, String)]) -> Option<Fields> {
    if pairs.is_empty() {
        return None;
    }
    let mut fields = Fields::new();
    for (key, value) in pairs {
        fields.push(key.as_str(), value.as_str());
    }
    Some(fields)
}

async fn options(args: &Args) -> Result<Options, BoxError> {
    let mut headers = Headers::new();
    for (name, value) in &args.headers {
        headers.append(name, value.as_str());
    }

    let body: Option<Body> = match (&args.data, &args.data_file) {
        (Some(data), _) => Some(data.clone().into()),
        (None, Some(path)) => Some(BodyStream::from_file(path).await?.into()),
        (None, None) => None,
    };

    Ok(Options::builder()
        .maybe_method(args.method.clone())
        .maybe_query(fields(&args.query))
        .maybe_form(fields(&args.form))
        .maybe_body(body)
        .headers(headers)
        .json(args.json)
        .redirects(!args.no_redirects)
        .maybe_max_redirects(args.max_redirects)
        .maybe_timeout(args.timeout.map(Duration::from_millis))
        .build())
}

fn print_response(response: &Response, include: bool) -> Result<(), BoxError> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if include {
        writeln!(out, "HTTP/1.1 {}", response.status)?;
        for (name, value) in response.raw_headers.iter() {
            writeln!(out, "{}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
        }
        writeln!(out)?;
    }

    match &response.body {
        ResponseBody::Text(text) => out.write_all(text.as_bytes())?,
        ResponseBody::Json(value) => writeln!(out, "{}", serde_json::to_string_pretty(value)?)?,
        ResponseBody::Bytes(bytes) => out.write_all(bytes)?,
    }
    out.flush()?;
    Ok(())
}

async fn run(args: Args) -> Result<(), BoxError> {
    let options = options(&args).await?;
    let response = Grab::new().request(args.url.as_str(), options).await?;
    print_response(&response, args.include)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    grab::trace::init(match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    });

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("grab: {}", err);
            ExitCode::FAILURE
        }
    }
}
