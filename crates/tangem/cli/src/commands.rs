use std::{error::Error, path::Path};

use colored::Colorize;
use nexum_tangem::{
    Bip44, Chain, DerivationPath, ExtendedPublicKey, ResponseApdu, ResponseStatus, Tlv, crc16,
};
use tracing::debug;

use crate::config::load_config;

/// Show the nodes and the wire encoding of a derivation path
pub fn path_command(path: &str) -> Result<(), Box<dyn Error>> {
    let path: DerivationPath = path.parse()?;

    println!("{} {}", "Path:".bold(), path);
    for (depth, node) in path.nodes().iter().enumerate() {
        let kind = if node.is_hardened() {
            "hardened"
        } else {
            "normal"
        };
        println!("  {depth}: {node} ({kind}, 0x{:08X})", node.value());
    }
    if path.has_hardened() {
        println!(
            "{} {}",
            "Not derivable without the card:".yellow(),
            path.to_non_hardened()
        );
    }
    println!("{} {}", "Bytes:".bold(), hex::encode(path.to_bytes()));

    Ok(())
}

pub fn bip44_command(
    coin: u32,
    account: u32,
    change: bool,
    index: u32,
) -> Result<(), Box<dyn Error>> {
    let bip44 = Bip44 {
        coin_type: coin,
        account,
        change: if change { Chain::Internal } else { Chain::External },
        address_index: index,
    };
    println!("{}", bip44.build_path());
    Ok(())
}

/// Derive a child key from a wallet key and chain code
pub fn derive_command(
    public_key: &str,
    chain_code: &str,
    path: &str,
) -> Result<(), Box<dyn Error>> {
    let path: DerivationPath = path.parse()?;
    let master =
        ExtendedPublicKey::from_slices(&hex::decode(public_key)?, &hex::decode(chain_code)?)?;
    debug!(%path, "Deriving locally");

    let child = master.derive_path(&path)?;

    println!("{} {}", "Path:".bold(), path);
    println!(
        "{} {}",
        "Public key:".bold(),
        hex::encode(child.compressed_public_key())
    );
    println!("{} {}", "Chain code:".bold(), hex::encode(child.chain_code()));

    Ok(())
}

pub fn tlv_command(data: &str) -> Result<(), Box<dyn Error>> {
    let tlvs = Tlv::deserialize(&hex::decode(data.trim())?)?;
    print_tlvs(&tlvs);
    Ok(())
}

/// Decode `data || sw1 sw2` as returned by the card
pub fn response_command(data: &str) -> Result<(), Box<dyn Error>> {
    let response = ResponseApdu::from_bytes(&hex::decode(data.trim())?)?;

    let status = response.status();
    let line = format!("{status:?} (0x{:04X})", response.sw());
    match status {
        ResponseStatus::Success => println!("{} {}", "Status:".bold(), line.green()),
        ResponseStatus::SecurityDelay { .. } => {
            println!("{} {}", "Status:".bold(), line.yellow())
        }
        _ => println!("{} {}", "Status:".bold(), line.red()),
    }

    if response.data().is_empty() {
        return Ok(());
    }
    // Encrypted payloads do not decode, show them raw
    match response.decoder() {
        Ok(decoder) => print_tlvs(decoder.tlvs()),
        Err(_) => println!("{} {}", "Data:".bold(), hex::encode_upper(response.data())),
    }

    Ok(())
}

pub fn crc_command(data: &str) -> Result<(), Box<dyn Error>> {
    let crc = crc16(&hex::decode(data.trim())?);
    println!("{crc:04X}");
    Ok(())
}

/// Print the configuration after defaults, file and environment are merged
pub fn config_command(file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let config = load_config(file)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn print_tlvs(tlvs: &[Tlv]) {
    if tlvs.is_empty() {
        println!("{}", "No records".dimmed());
    }
    for tlv in tlvs {
        println!("  {tlv}");
    }
}
