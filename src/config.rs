//! Command-line argument parsing for the `alto` driver (§6.7).

use std::path::PathBuf;

use clap::Parser;

use crate::system::SystemType;

/// Recognized CLI flags, mirroring the reference implementation's
/// getopt-style switches one for one.
#[derive(Parser, Debug)]
#[command(name = "alto", about = "Xerox Alto cycle-accurate emulator core")]
pub struct Args {
    /// Constant ROM image.
    #[arg(short = 'c', value_name = "FILE")]
    pub constant_rom: Option<PathBuf>,

    /// Microcode ROM image.
    #[arg(short = 'm', value_name = "FILE")]
    pub microcode_rom: Option<PathBuf>,

    /// Boot binary, loaded directly into main memory bank 0 at address 0.
    #[arg(short = 'b', value_name = "FILE")]
    pub boot_binary: Option<PathBuf>,

    /// Drive 0 disk image.
    #[arg(short = '1', value_name = "FILE")]
    pub disk1: Option<PathBuf>,

    /// Drive 1 disk image.
    #[arg(short = '2', value_name = "FILE")]
    pub disk2: Option<PathBuf>,

    /// Select the Alto I system variant.
    #[arg(short = 'i')]
    pub alto_i: bool,

    /// Select the Alto II 1K-ROM system variant.
    #[arg(long = "ii_1krom")]
    pub ii_1krom: bool,

    /// Select the Alto II 2K-ROM system variant.
    #[arg(long = "ii_2krom")]
    pub ii_2krom: bool,

    /// Select the Alto II 3K-RAM system variant.
    #[arg(long = "ii_3kram")]
    pub ii_3kram: bool,

    /// Own Ethernet station address.
    #[arg(short = 'e', value_name = "ADDR")]
    pub ether_address: Option<String>,

    /// Raises the log level to debug. Does not launch an interactive
    /// command loop; that is a non-goal of this crate (§1).
    #[arg(long = "debug")]
    pub debug: bool,

    /// Positional argument, treated as the drive-0 disk image.
    #[arg(value_name = "DISK1")]
    pub positional_disk1: Option<PathBuf>,
}

impl Args {
    /// Resolves the `-i`/`-ii_*` flags to a `SystemType`, defaulting to
    /// the Alto II 2K-ROM variant when none is given.
    pub fn system_type(&self) -> SystemType {
        if self.alto_i {
            SystemType::AltoI
        } else if self.ii_1krom {
            SystemType::AltoIi1KRom
        } else if self.ii_3kram {
            SystemType::AltoIi3KRam
        } else {
            SystemType::AltoIi2KRom
        }
    }

    /// The drive-0 image: the explicit `-1` flag wins over the
    /// positional argument.
    pub fn disk1_path(&self) -> Option<&PathBuf> {
        self.disk1.as_ref().or(self.positional_disk1.as_ref())
    }

    /// Parses `-e <addr>` as a hexadecimal station address (e.g. `22`),
    /// falling back to `0` when absent.
    pub fn parsed_ether_address(&self) -> u16 {
        self.ether_address
            .as_deref()
            .and_then(|s| u16::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_to_alto_ii_2krom() {
        let args = Args::parse_from(["alto"]);
        assert_eq!(args.system_type(), SystemType::AltoIi2KRom);
    }

    #[test]
    fn explicit_variant_flags_are_honored() {
        let args = Args::parse_from(["alto", "-i"]);
        assert_eq!(args.system_type(), SystemType::AltoI);
        let args = Args::parse_from(["alto", "--ii_3kram"]);
        assert_eq!(args.system_type(), SystemType::AltoIi3KRam);
    }

    #[test]
    fn positional_disk_falls_back_when_flag_absent() {
        let args = Args::parse_from(["alto", "foo.dsk"]);
        assert_eq!(args.disk1_path(), Some(&PathBuf::from("foo.dsk")));
    }

    #[test]
    fn explicit_disk1_flag_wins_over_positional() {
        let args = Args::parse_from(["alto", "-1", "explicit.dsk", "positional.dsk"]);
        assert_eq!(args.disk1_path(), Some(&PathBuf::from("explicit.dsk")));
    }

    #[test]
    fn ether_address_parses_as_hex() {
        let args = Args::parse_from(["alto", "-e", "22"]);
        assert_eq!(args.parsed_ether_address(), 0x22);
    }
}
