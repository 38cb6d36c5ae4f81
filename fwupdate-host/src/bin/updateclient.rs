//! UDP client for talking to a device's `UpdateServer`.
//!
//! Mirrors `updateclient.cpp`'s command set and exit codes: `upload`,
//! `rollback`, `erase`, `reset`, `version`. Exit codes match the original's
//! `ClientExecute*` functions (negative values wrap mod 256 on exit, the
//! same as the original's C `int main` return did on a POSIX host):
//! `-1` empty/missing argument, `-2` slot index out of range, `1` metadata
//! upload failed, `2` fragment upload failed, `-10` unknown command, `0`
//! success.

use std::io::Cursor;
use std::net::{SocketAddr, ToSocketAddrs};
use std::process::exit;

use clap::{Parser, Subcommand};

use fwupdate_core::protocol::{
    DATA_ID_ERASE_SLOT, DATA_ID_FIRMWARE_ROLLBACK, DATA_ID_FIRMWARE_UPDATE, DATA_ID_FIRMWARE_VERSION,
    DATA_ID_RESET, SID_PUT_FRAGMENT, SID_PUT_METADATA, SID_READ_DATA_BY_ID, SID_WRITE_DATA_BY_ID,
};
use fwupdate_crypto::DalekCrypto;
use fwupdate_host::firmware::split_firmware_sections;
use fwupdate_host::hexfile::HexFile;
use fwupdate_host::keyfile::KeyPair;
use fwupdate_host::sign::sign_fragments_ed25519;
use fwupdate_host::transport::{request, UdpTransport};

#[derive(Parser)]
#[command(name = "updateclient", about = "Upload and manage firmware on a device over UDP")]
struct Args {
    #[arg(short, long)]
    address: String,
    #[arg(short, long, default_value_t = 9000)]
    port: u16,
    #[arg(long, default_value_t = 0)]
    localport: u16,
    #[arg(short, long)]
    key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign (if `-k` is given) and upload a HEX firmware image, then trigger install.
    Upload { hexfile: String },
    /// Trigger a rollback to the last known-good firmware.
    Rollback,
    /// Erase one fragment slot.
    Erase { slot: u8 },
    /// Request a device reset.
    Reset,
    /// Read the currently running firmware version.
    Version,
}

fn is_positive(response: &[u8]) -> bool {
    response.len() >= 2 && response[1] == 0x00
}

fn connect(args: &Args) -> UdpTransport {
    let remote: SocketAddr = (args.address.as_str(), args.port)
        .to_socket_addrs()
        .unwrap_or_else(|err| {
            log::error!("failed to resolve {}:{}: {err}", args.address, args.port);
            exit(-1);
        })
        .next()
        .unwrap_or_else(|| {
            log::error!("no address found for {}:{}", args.address, args.port);
            exit(-1);
        });

    UdpTransport::bind(args.localport, remote).unwrap_or_else(|err| {
        log::error!("failed to bind local UDP socket: {err}");
        exit(-1);
    })
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    match &args.command {
        Command::Upload { hexfile } => run_upload(&args, hexfile),
        Command::Rollback => run_rollback(&args),
        Command::Erase { slot } => run_erase(&args, *slot),
        Command::Reset => run_reset(&args),
        Command::Version => run_version(&args),
    }
}

fn run_upload(args: &Args, hexfile: &str) {
    if hexfile.is_empty() {
        log::error!("missing hex file argument");
        exit(-1);
    }

    let text = std::fs::read_to_string(hexfile).unwrap_or_else(|err| {
        log::error!("failed to read {hexfile}: {err}");
        exit(-1);
    });

    let hex = HexFile::from_reader(Cursor::new(text)).unwrap_or_else(|err| {
        log::error!("failed to parse {hexfile}: {err}");
        exit(-1);
    });
    let section = hex.single_section().unwrap_or_else(|err| {
        log::error!("{err}");
        exit(-1);
    });
    let mut image = split_firmware_sections(section).unwrap_or_else(|err| {
        log::error!("failed to locate metadata in {hexfile}: {err}");
        exit(-1);
    });

    if let Some(key_path) = &args.key {
        let key_text = std::fs::read_to_string(key_path).unwrap_or_else(|err| {
            log::error!("failed to read key file {key_path}: {err}");
            exit(-1);
        });
        let keypair = KeyPair::from_pem(&key_text).unwrap_or_else(|err| {
            log::error!("failed to parse key file {key_path}: {err}");
            exit(-1);
        });
        let crypto = DalekCrypto;
        if !sign_fragments_ed25519(&mut image.fragments, &crypto, &keypair.secret_key, &keypair.public_key) {
            log::error!("fragment signing failed to verify against its own public key");
            exit(2);
        }
    }

    let transport = connect(args);

    let metadata_response = request(&transport, SID_PUT_METADATA, &image.metadata.encode())
        .unwrap_or_else(|err| {
            log::error!("metadata upload failed: {err}");
            exit(1);
        });
    if !is_positive(&metadata_response) {
        log::error!("device rejected metadata");
        exit(1);
    }

    for fragment in &image.fragments {
        let fragment_response = request(&transport, SID_PUT_FRAGMENT, &fragment.encode())
            .unwrap_or_else(|err| {
                log::error!("fragment {} upload failed: {err}", fragment.number);
                exit(2);
            });
        if !is_positive(&fragment_response) {
            log::error!("device rejected fragment {}", fragment.number);
            exit(2);
        }
    }

    let install_response = request(&transport, SID_WRITE_DATA_BY_ID, &[DATA_ID_FIRMWARE_UPDATE])
        .unwrap_or_else(|err| {
            log::error!("install trigger failed: {err}");
            exit(2);
        });
    if !is_positive(&install_response) {
        log::error!("device rejected install trigger");
        exit(2);
    }

    log::info!("uploaded {hexfile} ({} fragments)", image.fragments.len());
    exit(0);
}

fn run_rollback(args: &Args) {
    let transport = connect(args);
    let response = request(&transport, SID_WRITE_DATA_BY_ID, &[DATA_ID_FIRMWARE_ROLLBACK])
        .unwrap_or_else(|err| {
            log::error!("rollback request failed: {err}");
            exit(2);
        });
    if !is_positive(&response) {
        log::error!("device rejected rollback");
        exit(2);
    }
    log::info!("rollback triggered");
    exit(0);
}

fn run_erase(args: &Args, slot: u8) {
    let transport = connect(args);
    let response = request(&transport, SID_WRITE_DATA_BY_ID, &[DATA_ID_ERASE_SLOT, slot])
        .unwrap_or_else(|err| {
            log::error!("erase request failed: {err}");
            exit(-2);
        });
    if !is_positive(&response) {
        log::error!("device rejected erase of slot {slot}");
        exit(-2);
    }
    log::info!("erased slot {slot}");
    exit(0);
}

fn run_reset(args: &Args) {
    let transport = connect(args);
    let response = request(&transport, SID_WRITE_DATA_BY_ID, &[DATA_ID_RESET])
        .unwrap_or_else(|err| {
            log::error!("reset request failed: {err}");
            exit(2);
        });
    if !is_positive(&response) {
        log::error!("device rejected reset");
        exit(2);
    }
    log::info!("reset requested");
    exit(0);
}

fn run_version(args: &Args) {
    let transport = connect(args);
    let response = request(&transport, SID_READ_DATA_BY_ID, &[DATA_ID_FIRMWARE_VERSION])
        .unwrap_or_else(|err| {
            log::error!("version request failed: {err}");
            exit(2);
        });
    if !is_positive(&response) || response.len() < 6 {
        log::error!("device rejected version read");
        exit(2);
    }
    let version = u32::from_le_bytes(response[2..6].try_into().unwrap());
    log::info!("firmware version: {version}");
    exit(0);
}
