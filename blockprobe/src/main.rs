mod logger;

use std::{fs::File, path::PathBuf, process::ExitCode};

use clap::{Parser, ValueEnum};
use libblockprobe::{
    BlockidError, FilterFlag, Probe, ProbeOutcome, ProbeValues, TagName, UsageFlags,
    util::{all_block_paths, block_from_label, block_from_uuid},
};

const EXIT_OK: u8 = 0;
const EXIT_NOTFOUND: u8 = 2;
const EXIT_USAGE: u8 = 4;
const EXIT_AMBIVALENT: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// `NAME="value"` pairs prefixed with the device path
    Full,
    /// Tag values only, one per line
    Value,
    /// Device path only
    Device,
    /// `NAME=value` lines for shell eval
    Export,
    /// `ID_FS_*` key-value lines
    Udev,
}

#[derive(Debug, Parser)]
#[command(
    name = "blockprobe",
    version,
    about = "Locate and print block device attributes"
)]
struct Cli {
    /// Devices to probe; every block device when empty
    devices: Vec<PathBuf>,

    /// Switch to low-level superblock probing mode
    #[arg(short = 'p', long = "probe")]
    lowprobe: bool,

    /// Probe at the given byte offset (low-level mode only)
    #[arg(short = 'O', long = "offset", requires = "lowprobe")]
    offset: Option<u64>,

    /// Restrict the probing window to the given byte size (low-level mode only)
    #[arg(short = 'S', long = "size", requires = "lowprobe")]
    size: Option<u64>,

    /// Restrict probing to the listed usage classes; a leading "no"
    /// inverts the list (e.g. "nofilesystem,other")
    #[arg(short = 'u', long = "usages", value_delimiter = ',')]
    usages: Vec<String>,

    /// Restrict probing to the listed superblock types; a leading "no"
    /// inverts the list
    #[arg(short = 'n', long = "match-types", value_delimiter = ',')]
    types: Vec<String>,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = OutputFormat::Full)]
    output: OutputFormat,

    /// Show only the named tags
    #[arg(short = 's', long = "match-tag")]
    tags: Vec<String>,

    /// Look up only the first device matching the -t token
    #[arg(short = 'l', long = "list-one", requires = "token")]
    list_one: bool,

    /// NAME=value token restricting which devices are shown
    #[arg(short = 't', long = "match-token")]
    token: Option<String>,

    /// Print the device carrying the given filesystem uuid
    #[arg(short = 'U', long = "uuid", conflicts_with = "label")]
    uuid: Option<String>,

    /// Print the device carrying the given filesystem label
    #[arg(short = 'L', long = "label")]
    label: Option<String>,
}

fn parse_usage_filter(items: &[String]) -> Option<(FilterFlag, UsageFlags)> {
    let invert = items.first().is_some_and(|i| i.starts_with("no"));
    let mut mask = UsageFlags::empty();

    for item in items {
        let name = if invert {
            item.strip_prefix("no").unwrap_or(item)
        } else {
            item.as_str()
        };
        mask |= match name {
            "filesystem" => UsageFlags::FILESYSTEM,
            "raid" => UsageFlags::RAID,
            "crypto" => UsageFlags::CRYPTO,
            "other" => UsageFlags::OTHER,
            "parttable" => UsageFlags::PARTTABLE,
            _ => {
                eprintln!("blockprobe: unknown usage class {name:?}");
                return None;
            }
        };
    }

    let flag = if invert {
        FilterFlag::NotIn
    } else {
        FilterFlag::OnlyIn
    };
    Some((flag, mask))
}

fn parse_type_filter(items: &[String]) -> (FilterFlag, Vec<String>) {
    let invert = items.first().is_some_and(|i| i.starts_with("no"));
    let names: Vec<String> = items
        .iter()
        .map(|item| {
            if invert {
                item.strip_prefix("no").unwrap_or(item).to_string()
            } else {
                item.clone()
            }
        })
        .collect();

    let flag = if invert {
        FilterFlag::NotIn
    } else {
        FilterFlag::OnlyIn
    };
    (flag, names)
}

/// The safe default mode hides raw duplicates and the magic bookkeeping
/// tags; `-p` shows everything.
fn tag_visible(cli: &Cli, name: TagName) -> bool {
    if !cli.tags.is_empty() {
        return cli.tags.iter().any(|t| t == &name.to_string());
    }
    if cli.lowprobe {
        return true;
    }
    !matches!(
        name,
        TagName::LabelRaw | TagName::UuidRaw | TagName::Sbmagic | TagName::SbmagicOffset
    )
}

fn udev_key(name: TagName) -> String {
    match name {
        TagName::PtType => "ID_PART_TABLE_TYPE".to_string(),
        TagName::PtUuid => "ID_PART_TABLE_UUID".to_string(),
        other => format!("ID_FS_{other}"),
    }
}

/// Escape a value for udev consumption; anything outside the printable
/// ASCII range becomes `\x..`.
fn udev_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

fn print_values(cli: &Cli, path: &PathBuf, values: &ProbeValues) {
    match cli.output {
        OutputFormat::Device => {
            println!("{}", path.display());
        }
        OutputFormat::Value => {
            for value in values.iter().filter(|v| tag_visible(cli, v.name())) {
                println!("{}", value.as_str());
            }
        }
        OutputFormat::Export => {
            for value in values.iter().filter(|v| tag_visible(cli, v.name())) {
                println!("{}={}", value.name(), value.as_str());
            }
            println!();
        }
        OutputFormat::Udev => {
            for value in values.iter().filter(|v| tag_visible(cli, v.name())) {
                let name = value.name();
                println!("{}={}", udev_key(name), value.as_str());
                if matches!(name, TagName::Label | TagName::Uuid) {
                    println!("{}_ENC={}", udev_key(name), udev_encode(value.data()));
                }
            }
        }
        OutputFormat::Full => {
            let line: Vec<String> = values
                .iter()
                .filter(|v| tag_visible(cli, v.name()))
                .map(|v| format!("{}=\"{}\"", v.name(), v.as_str()))
                .collect();
            if !line.is_empty() {
                println!("{}: {}", path.display(), line.join(" "));
            }
        }
    }
}

/// Re-walk the chain collecting every claiming probe as
/// `usage:type[:version]`, the way udev consumers expect them.
fn ambivalent_candidates(probe: &mut Probe) -> Vec<String> {
    let mut candidates = Vec::new();

    probe.reset_chain();
    while let Ok(ProbeOutcome::Found) = probe.do_probe() {
        let values = probe.values();
        let usage = values
            .lookup_string(TagName::Usage)
            .unwrap_or_else(|| "other".to_string());
        let fstype = match values.lookup_string(TagName::Type) {
            Some(t) => t,
            None => match values.lookup_string(TagName::PtType) {
                Some(t) => t,
                None => continue,
            },
        };

        match values.lookup_string(TagName::Version) {
            Some(version) => candidates.push(format!("{usage}:{fstype}:{version}")),
            None => candidates.push(format!("{usage}:{fstype}")),
        }
    }

    candidates
}

fn build_probe(cli: &Cli, path: &PathBuf) -> Result<Probe, BlockidError> {
    if cli.lowprobe {
        let file = File::open(path)?;
        return Probe::new(file, path, cli.offset.unwrap_or(0), cli.size);
    }
    Probe::from_filename(path)
}

fn apply_filters(cli: &Cli, probe: &mut Probe) -> Result<(), ()> {
    if !cli.usages.is_empty() {
        let (flag, mask) = parse_usage_filter(&cli.usages).ok_or(())?;
        probe.filter_mut().filter_usage(flag, mask);
    }
    if !cli.types.is_empty() {
        let (flag, names) = parse_type_filter(&cli.types);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        probe.filter_mut().filter_types(flag, &names);
    }
    Ok(())
}

fn token_matches(values: &ProbeValues, token: &str) -> bool {
    let Some((name, wanted)) = token.split_once('=') else {
        return false;
    };
    values
        .iter()
        .any(|v| v.name().to_string() == name && v.as_str() == wanted)
}

fn run(cli: &Cli) -> u8 {
    if let Some(uuid) = &cli.uuid {
        return match block_from_uuid(uuid) {
            Ok(path) => {
                println!("{}", path.display());
                EXIT_OK
            }
            Err(_) => EXIT_NOTFOUND,
        };
    }
    if let Some(label) = &cli.label {
        return match block_from_label(label) {
            Ok(path) => {
                println!("{}", path.display());
                EXIT_OK
            }
            Err(_) => EXIT_NOTFOUND,
        };
    }

    if cli.token.is_some() && cli.token.as_deref().is_none_or(|t| !t.contains('=')) {
        eprintln!("blockprobe: -t expects a NAME=value token");
        return EXIT_USAGE;
    }
    if cli.lowprobe && cli.devices.is_empty() {
        eprintln!("blockprobe: low-level probing requires at least one device");
        return EXIT_USAGE;
    }

    let devices = if cli.devices.is_empty() {
        all_block_paths()
    } else {
        cli.devices.clone()
    };

    let mut found = false;
    let mut ambivalent = false;

    for path in &devices {
        let mut probe = match build_probe(cli, path) {
            Ok(probe) => probe,
            Err(e) => {
                // unprobeable entries from the fallback scan are routine
                if cli.devices.is_empty() {
                    log::debug!("skipping {}: {e}", path.display());
                } else {
                    eprintln!("blockprobe: {}: {e}", path.display());
                }
                continue;
            }
        };
        if apply_filters(cli, &mut probe).is_err() {
            return EXIT_USAGE;
        }

        match probe.do_safeprobe() {
            Ok(ProbeOutcome::Found) => (),
            Ok(ProbeOutcome::Nothing) => continue,
            Err(BlockidError::AmbivalentProbe(_)) => {
                ambivalent = true;
                let candidates = ambivalent_candidates(&mut probe).join(" ");
                if cli.output == OutputFormat::Udev {
                    println!("ID_FS_AMBIVALENT={candidates}");
                } else {
                    eprintln!(
                        "blockprobe: {}: ambivalent signatures ({candidates}), \
                         use wipefs to remove the stale ones",
                        path.display()
                    );
                }
                continue;
            }
            Err(e) => {
                eprintln!("blockprobe: {}: {e}", path.display());
                continue;
            }
        }

        if let Some(token) = &cli.token
            && !token_matches(probe.values(), token)
        {
            continue;
        }

        found = true;
        print_values(cli, path, probe.values());

        if cli.list_one {
            break;
        }
    }

    if ambivalent {
        return EXIT_AMBIVALENT;
    }
    if !found {
        return EXIT_NOTFOUND;
    }
    EXIT_OK
}

fn main() -> ExitCode {
    logger::init_logger();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version are not usage errors
            if e.use_stderr() {
                let _ = e.print();
                return ExitCode::from(EXIT_USAGE);
            }
            let _ = e.print();
            return ExitCode::from(EXIT_OK);
        }
    };

    ExitCode::from(run(&cli))
}
