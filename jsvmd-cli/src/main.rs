use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jsvmd_isa::{MapFile, OpcodeMap, SwappedOpcodes};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "jsvmd", about = "Stack-VM obfuscator decompiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Disassemble a payload to a human-readable instruction listing
    Disasm {
        /// Base64 bytecode payload file
        bytecode: PathBuf,
        /// Opcode map exchange file (JSON)
        #[arg(short, long)]
        map: PathBuf,
        /// String-table byte blob
        #[arg(short, long)]
        strings: Option<PathBuf>,
    },
    /// Decompile a payload to reconstructed source
    Decompile {
        /// Base64 bytecode payload file
        bytecode: PathBuf,
        /// Opcode map exchange file (JSON)
        #[arg(short, long)]
        map: PathBuf,
        /// String-table byte blob
        #[arg(short, long)]
        strings: Option<PathBuf>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Disasm {
            bytecode,
            map,
            strings,
        } => cmd_disasm(&bytecode, &map, strings.as_deref()),
        Commands::Decompile {
            bytecode,
            map,
            strings,
            output,
        } => cmd_decompile(&bytecode, &map, strings.as_deref(), output.as_deref()),
    }
}

fn load_map(path: &std::path::Path) -> (OpcodeMap, SwappedOpcodes) {
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading map file {}: {e}", path.display());
        std::process::exit(1);
    });
    let file: MapFile = serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("Error parsing map file {}: {e}", path.display());
        std::process::exit(1);
    });
    file.into_parts()
}

fn load_strings(path: Option<&std::path::Path>) -> Vec<String> {
    let Some(path) = path else {
        return vec![];
    };
    let bytes = fs::read(path).unwrap_or_else(|e| {
        eprintln!("Error reading string table {}: {e}", path.display());
        std::process::exit(1);
    });
    jsvmd_payload::string_table::decode(&bytes)
}

fn load_payload(
    path: &std::path::Path,
    map: &OpcodeMap,
) -> (Vec<u8>, jsvmd_isa::Version) {
    let text = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading bytecode {}: {e}", path.display());
        std::process::exit(1);
    });
    jsvmd_payload::transport::decode(&text, map).unwrap_or_else(|e| {
        eprintln!("Error decoding payload: {e}");
        std::process::exit(1);
    })
}

fn cmd_disasm(bytecode: &std::path::Path, map_path: &std::path::Path, strings: Option<&std::path::Path>) {
    let (map, _) = load_map(map_path);
    let strings = load_strings(strings);
    let (bytes, version) = load_payload(bytecode, &map);

    println!("# jsvmd disassembly");
    println!("# Version: {version}");
    println!("# Decoded bytes: {}", bytes.len());
    println!();
    print!(
        "{}",
        jsvmd_decompiler::disassemble_listing(&bytes, version, &strings, &map)
    );
}

fn cmd_decompile(
    bytecode: &std::path::Path,
    map_path: &std::path::Path,
    strings: Option<&std::path::Path>,
    output: Option<&std::path::Path>,
) {
    let (map, swapped) = load_map(map_path);
    let strings = load_strings(strings);
    let (bytes, version) = load_payload(bytecode, &map);

    let source = jsvmd_decompiler::decompile_bytes(&bytes, version, &strings, &map, &swapped);

    match output {
        Some(path) => {
            fs::write(path, &source).unwrap_or_else(|e| {
                eprintln!("Error writing {}: {e}", path.display());
                std::process::exit(1);
            });
        }
        None => print!("{source}"),
    }
}
