//! fswatchctl — command-line control client for fswatchd.
//!
//! Speaks the daemon's line-oriented JSON protocol over TCP. One connection,
//! one request per command (list_queues issues several).

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process::exit;

use serde_json::{json, Value};

const DEFAULT_PORT: u16 = 5559;

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(port: u16) -> Self {
        let stream = match TcpStream::connect(("127.0.0.1", port)) {
            Ok(stream) => stream,
            Err(e) => {
                println!("Failed to connect to fswatchd on port {port}: {e}");
                exit(1);
            }
        };
        let reader = match stream.try_clone() {
            Ok(clone) => BufReader::new(clone),
            Err(e) => {
                println!("Failed to set up connection: {e}");
                exit(1);
            }
        };
        Self {
            reader,
            writer: stream,
        }
    }

    /// Send one request object, wait for the reply line. Exits with a
    /// message on transport failures and on error replies.
    fn call(&mut self, request: Value) -> Value {
        let reply = self.call_raw(request);
        if let Some(error) = reply.get("error") {
            let code = error.get("code").and_then(Value::as_u64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            println!("Error {code}: {message}");
            exit(1);
        }
        reply
    }

    fn call_raw(&mut self, request: Value) -> Value {
        if writeln!(self.writer, "{request}").is_err() {
            println!("Failed to send request to fswatchd");
            exit(1);
        }
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!("Connection to fswatchd closed unexpectedly");
                exit(1);
            }
            Ok(_) => {}
        }
        match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(_) => {
                println!("Data received from server had invalid format");
                exit(1);
            }
        }
    }

    fn roots(&mut self) -> Vec<String> {
        let reply = self.call(json!({"call": "get_roots"}));
        reply
            .get("data")
            .and_then(Value::as_array)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn queue_size(&mut self, dir: &str) -> u64 {
        let reply = self.call(json!({"call": "get_queue_size", "path": dir}));
        reply.get("data").and_then(Value::as_u64).unwrap_or(0)
    }

    fn get_events(&mut self, dir: &str, count: i64) -> Vec<Value> {
        let reply = self.call(json!({"call": "get_events", "path": dir, "count": count}));
        reply
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

fn print_events(events: &[Value]) {
    for event in events {
        let path = event.get("path").and_then(Value::as_str).unwrap_or("?");
        let name = event.get("name").and_then(Value::as_str).unwrap_or("?");
        let mask = event.get("mask").and_then(Value::as_u64).unwrap_or(0);
        let sep = if path == "/" { "" } else { "/" };
        match event.get("cookie").and_then(Value::as_u64) {
            Some(cookie) => println!("{path}{sep}{name}  mask:{mask:#x} cookie:{cookie}"),
            None => println!("{path}{sep}{name}  mask:{mask:#x}"),
        }
    }
}

fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() {
        println!("No command specified. Run `fswatchctl --help` for more info.");
        exit(1);
    }

    let mut port = DEFAULT_PORT;
    let mut idx = 0;

    match argv[0].as_str() {
        "-h" | "--help" => print_help(),
        "-p" | "--port" => {
            if argv.len() < 3 {
                print_help();
            }
            port = match argv[1].parse() {
                Ok(port) => port,
                Err(_) => print_help(),
            };
            idx = 2;
        }
        _ => {}
    }

    let command = argv[idx].as_str();
    let args = &argv[idx + 1..];
    let mut client = Client::connect(port);

    match (command, args) {
        ("list_roots", []) => {
            let roots = client.roots();
            if roots.is_empty() {
                println!("There are no currently watched roots");
            }
            for root in roots {
                println!("{root}");
            }
        }
        ("list_queues", []) => {
            let roots = client.roots();
            if roots.is_empty() {
                println!("There are no currently watched roots");
            }
            for root in roots {
                let size = client.queue_size(&root);
                println!("{root}  {size}");
            }
        }
        ("watch", [dir]) => {
            client.call(json!({"call": "watch", "path": dir}));
            println!("Watching new root at {dir}");
        }
        ("watch", [dir, flag]) if flag == "--rewatch" => {
            client.call(json!({"call": "watch", "path": dir, "rewatch": true}));
            println!("Watching new root at {dir} (restored on restart)");
        }
        ("unwatch", [dir]) => {
            client.call(json!({"call": "unwatch", "path": dir}));
            println!("Unwatched root at {dir}");
        }
        ("pause", [dir]) => {
            client.call(json!({"call": "pause", "path": dir}));
            println!("Paused root at {dir}");
        }
        ("unpause", [dir]) => {
            client.call(json!({"call": "unpause", "path": dir}));
            println!("Unpaused root at {dir}");
        }
        ("queue_size", [dir]) => {
            let size = client.queue_size(dir);
            println!("{size}");
        }
        ("flush_queue", [dir]) => {
            let flushed = client.get_events(dir, 0).len();
            println!("Flushed {flushed} events from {dir}");
        }
        ("get_events", [dir, count]) => {
            let count: i64 = match count.parse() {
                Ok(count) => count,
                Err(_) => {
                    println!("ERROR: event count must be an integer");
                    exit(1);
                }
            };
            let events = client.get_events(dir, count);
            print_events(&events);
        }
        ("ping", []) => {
            let reply = client.call(json!({"call": "ping"}));
            match reply.get("data").and_then(Value::as_str) {
                Some(data) => println!("{data}"),
                None => println!("unexpected reply: {reply}"),
            }
        }
        ("status", []) => {
            let reply = client.call(json!({"call": "status"}));
            let watches = reply.get("watches").and_then(Value::as_u64).unwrap_or(0);
            let uptime = reply.get("uptime").and_then(Value::as_str).unwrap_or("?");
            println!("watches: {watches}");
            println!("uptime:  {uptime}");
        }
        _ => {
            println!("ERROR: unknown command or wrong arguments: {command}");
            print_help();
        }
    }
}

fn print_help() -> ! {
    println!();
    println!("Usage: fswatchctl [option] <command> [command args]");
    println!();
    println!("Options:");
    println!(" -h, --help                  Print this help menu");
    println!(" -p, --port <num>            Use a port other than the default {DEFAULT_PORT}");
    println!();
    println!("Commands:");
    println!(" - list_roots                List each currently watched root.");
    println!(" - list_queues               List each currently watched root");
    println!("                             and its current queue size.");
    println!(" - watch <dir> [--rewatch]   Watch a new root at directory <dir>;");
    println!("                             --rewatch restores it after a restart.");
    println!(" - unwatch <dir>             Unwatch a root with directory <dir>.");
    println!(" - pause <dir>               Stop queueing events for a root.");
    println!(" - unpause <dir>             Resume queueing events for a root.");
    println!(" - queue_size <dir>          Get the queue size for a specific root.");
    println!(" - flush_queue <dir>         Flush the queue for a specific root.");
    println!(" - get_events <dir> <count>  Get events for a specific root.");
    println!("                             A count of 0 (zero) will retrieve *all*");
    println!("                             the events currently in that root's queue.");
    println!(" - ping                      Check that the daemon is alive.");
    println!(" - status                    Print watch count and uptime.");
    exit(1);
}
