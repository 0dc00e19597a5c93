//! Interactive line client for the Unix-domain-socket server, grounded in
//! the original reference client: connect, read a line from stdin, write it
//! followed by a newline, print the response line.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

use clap::Parser;

/// Interactive client for the transactional key-value server.
#[derive(Parser, Debug)]
#[command(name = "kvtxn-cli", about = "Interactive client for kvtxn-server")]
struct Args {
    /// Unix-domain-socket path to connect to.
    #[arg(long, default_value = "/tmp/kvtxn.sock")]
    socket: String,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let stream = UnixStream::connect(&args.socket)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    let stdin = io::stdin();
    let mut response = String::new();

    println!("connected to {}", args.socket);
    print!("> ");
    io::stdout().flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            print!("> ");
            io::stdout().flush()?;
            continue;
        }

        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;

        response.clear();
        match reader.read_line(&mut response) {
            Ok(0) => {
                println!("connection closed by server");
                break;
            }
            Ok(_) => print!("{response}"),
            Err(err) => {
                eprintln!("read error: {err}");
                break;
            }
        }

        print!("> ");
        io::stdout().flush()?;
    }

    Ok(())
}
