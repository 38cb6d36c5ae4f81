//! Signs a HEX firmware image's metadata header in place.
//!
//! Mirrors `hexsign.cpp`: read one HEX file, sign `firmware_signature` and
//! `metadata_signature` in its metadata record, write the result back out.
//! Exit codes follow the original: `1` bad key, `2` bad input file, `3` bad
//! output file, `0` success.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::process::ExitCode;

use clap::Parser;

use fwupdate_crypto::DalekCrypto;
use fwupdate_host::firmware::split_firmware_sections;
use fwupdate_host::hexfile::HexFile;
use fwupdate_host::keyfile::KeyPair;
use fwupdate_host::sign::sign_firmware_image;

#[derive(Parser)]
#[command(name = "hexsign", about = "Sign a HEX firmware image's metadata header")]
struct Args {
    #[arg(short, long)]
    input: String,
    #[arg(short, long)]
    output: String,
    #[arg(short, long)]
    key: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let key_text = match std::fs::read_to_string(&args.key) {
        Ok(text) => text,
        Err(err) => {
            log::error!("failed to read key file {}: {err}", args.key);
            return ExitCode::from(1);
        }
    };
    let keypair = match KeyPair::from_pem(&key_text) {
        Ok(keypair) => keypair,
        Err(err) => {
            log::error!("failed to parse key file {}: {err}", args.key);
            return ExitCode::from(1);
        }
    };

    let input_file = match File::open(&args.input) {
        Ok(file) => file,
        Err(err) => {
            log::error!("failed to open input file {}: {err}", args.input);
            return ExitCode::from(2);
        }
    };
    let hex = match HexFile::from_reader(BufReader::new(input_file)) {
        Ok(hex) => hex,
        Err(err) => {
            log::error!("failed to parse input file {}: {err}", args.input);
            return ExitCode::from(2);
        }
    };
    let section = match hex.single_section() {
        Ok(section) => section,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::from(2);
        }
    };
    let mut image = match split_firmware_sections(section) {
        Ok(image) => image,
        Err(err) => {
            log::error!("failed to locate metadata in {}: {err}", args.input);
            return ExitCode::from(2);
        }
    };

    let crypto = DalekCrypto;
    if !sign_firmware_image(
        &mut image.metadata,
        section,
        &crypto,
        &keypair.secret_key,
        &keypair.public_key,
    ) {
        log::error!("signature failed to verify against its own public key");
        return ExitCode::from(1);
    }

    let rebuilt = fwupdate_host::firmware::to_section(&image, section.start_address);
    let output_hex = HexFile {
        sections: vec![rebuilt],
    };

    let output_file = match File::create(&args.output) {
        Ok(file) => file,
        Err(err) => {
            log::error!("failed to create output file {}: {err}", args.output);
            return ExitCode::from(3);
        }
    };
    if let Err(err) = output_hex.to_writer(BufWriter::new(output_file)) {
        log::error!("failed to write output file {}: {err}", args.output);
        return ExitCode::from(3);
    }

    log::info!("signed {} -> {}", args.input, args.output);
    ExitCode::from(0)
}
