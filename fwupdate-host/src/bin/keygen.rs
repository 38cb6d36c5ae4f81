//! Generates a fresh Ed25519 keypair and writes it as an OpenSSH private key
//! file.
//!
//! `keyfile/generate_keyfile.cpp` only ever emitted a C header embedding an
//! existing public key; nothing in the original generates a new keypair in
//! OpenSSH's own format. This supplements that: the output here is a normal
//! `ssh-keygen -t ed25519`-compatible private key file, directly usable with
//! `hexsign`/`updateclient`'s `-k`/`--key` flag.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;

use fwupdate_host::keyfile::KeyPair;

#[derive(Parser)]
#[command(name = "keygen", about = "Generate an Ed25519 OpenSSH private key file")]
struct Args {
    #[arg(short, long)]
    output: String,
    #[arg(short, long, default_value = "")]
    comment: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let keypair = KeyPair::generate();
    let pem_text = keypair.to_pem(&args.comment);

    let mut file = match std::fs::File::create(&args.output) {
        Ok(file) => file,
        Err(err) => {
            log::error!("failed to create {}: {err}", args.output);
            return ExitCode::from(3);
        }
    };
    if let Err(err) = file.write_all(pem_text.as_bytes()) {
        log::error!("failed to write {}: {err}", args.output);
        return ExitCode::from(3);
    }

    log::info!("wrote {} (public key: {})", args.output, hex_encode(&keypair.public_key));
    ExitCode::from(0)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
