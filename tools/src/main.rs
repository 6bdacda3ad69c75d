use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use compat_jk::gob::{self, GobArchive};
use engine_core::vfs::{self, Archive};
use engine_core::{ExtractConfig, Layer, Vfs};
use level_cook::{load_episode, load_level};

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_CONFIG: i32 = 10;
const EXIT_ARCHIVE: i32 = 11;
const EXIT_LEVEL: i32 = 12;
const EXIT_OUTPUT: i32 = 13;

#[derive(Parser)]
#[command(name = "tools", version, about = "Jedi Knight asset tools CLI")]
struct Cli {
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Gob(GobArgs),
    /// Lists every name the mounted archives resolve, with its source.
    Names(MountArgs),
    /// Builds a level and writes a PNG preview from its first spawn point.
    Render {
        #[command(flatten)]
        mount: MountArgs,
        #[arg(long)]
        level: String,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Builds every level the archives' episode.jk lists.
    Episode(MountArgs),
}

#[derive(Parser)]
struct GobArgs {
    #[command(subcommand)]
    command: GobCommand,
}

#[derive(Subcommand)]
enum GobCommand {
    List {
        #[arg(long, value_name = "PATH")]
        archive: PathBuf,
    },
    Extract {
        #[arg(long, value_name = "PATH")]
        archive: PathBuf,
        #[arg(long, value_name = "DIR")]
        out: PathBuf,
    },
}

#[derive(Parser)]
struct MountArgs {
    /// Directory holding the official archives.
    #[arg(long, value_name = "PATH")]
    game_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Level archives (.gob, .goo or .zip), lowest priority first.
    #[arg(value_name = "ARCHIVE")]
    archives: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let exit_code = match cli.command {
        Commands::Gob(args) => run_gob(args),
        Commands::Names(args) => run_names(&args),
        Commands::Render { mount, level, out } => run_render(&mount, &level, &out),
        Commands::Episode(args) => run_episode(&args),
    };
    std::process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if let Err(err) = simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::default().build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    ) {
        eprintln!("logger init failed: {}", err);
    }
}

fn run_gob(args: GobArgs) -> i32 {
    match args.command {
        GobCommand::List { archive } => gob_list(&archive),
        GobCommand::Extract { archive, out } => gob_extract(&archive, &out),
    }
}

fn read_archive(path: &Path) -> Result<GobArchive, i32> {
    gob::read_gob(path).map_err(|err| {
        eprintln!("gob parse failed for {}: {}", path.display(), err);
        EXIT_ARCHIVE
    })
}

fn gob_list(path: &Path) -> i32 {
    let archive = match read_archive(path) {
        Ok(archive) => archive,
        Err(code) => return code,
    };
    println!("gob: {}", path.display());
    for entry in archive.entries() {
        println!("{:>10} {:>10} {}", entry.offset, entry.length, entry.name);
    }
    EXIT_SUCCESS
}

fn gob_extract(path: &Path, out_dir: &Path) -> i32 {
    let archive = match read_archive(path) {
        Ok(archive) => archive,
        Err(code) => return code,
    };
    if let Err(err) = archive.extract_all(out_dir) {
        eprintln!("gob extract failed: {}", err);
        return EXIT_ARCHIVE;
    }
    println!("extracted {} entries to {}", archive.len(), out_dir.display());
    EXIT_SUCCESS
}

fn load_config(path: Option<&Path>) -> Result<ExtractConfig, i32> {
    let config = match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|err| {
                eprintln!("config read failed for {}: {}", path.display(), err);
                EXIT_CONFIG
            })?;
            ExtractConfig::parse_toml(&text).map_err(|err| {
                eprintln!("config parse failed: {}", err);
                EXIT_CONFIG
            })?
        }
        None => ExtractConfig::default(),
    };
    let validation = config.validate();
    for warning in &validation.warnings {
        log::warn!("config: {}", warning);
    }
    if !validation.is_ok() {
        for error in &validation.errors {
            eprintln!("config: {}", error);
        }
        return Err(EXIT_CONFIG);
    }
    Ok(config)
}

fn open_archives(paths: &[PathBuf]) -> Result<Vec<Archive>, i32> {
    let mut archives = Vec::new();
    for path in paths {
        let is_zip = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        let opened = if is_zip {
            vfs::open_zip(path)
        } else {
            Archive::open_gob(path).map(|archive| vec![archive])
        };
        match opened {
            Ok(opened) => archives.extend(opened),
            Err(err) => {
                eprintln!("archive open failed for {}: {}", path.display(), err);
                return Err(EXIT_ARCHIVE);
            }
        }
    }
    Ok(archives)
}

fn mount(args: &MountArgs) -> Result<(ExtractConfig, Vfs), i32> {
    let config = load_config(args.config.as_deref())?;
    if args.archives.is_empty() && args.game_dir.is_none() {
        eprintln!("no archives given");
        return Err(EXIT_USAGE);
    }
    let archives = open_archives(&args.archives)?;
    let vfs = match &args.game_dir {
        Some(game_dir) => Vfs::open_with_official(&config, game_dir, archives),
        None => Vfs::open(archives),
    };
    for summary in vfs.mounts() {
        log::debug!(
            "mounted {} ({}, {:?}, {} names)",
            summary.label,
            summary.kind,
            summary.layer,
            summary.entries
        );
    }
    Ok((config, vfs))
}

fn run_names(args: &MountArgs) -> i32 {
    let (_config, vfs) = match mount(args) {
        Ok(mounted) => mounted,
        Err(code) => return code,
    };
    for name in vfs.names() {
        let source = vfs
            .source_of(name)
            .map(|source| source.label)
            .unwrap_or_default();
        println!("{} <- {}", name, source);
    }
    EXIT_SUCCESS
}

fn run_render(args: &MountArgs, level: &str, out: &Path) -> i32 {
    let (config, vfs) = match mount(args) {
        Ok(mounted) => mounted,
        Err(code) => return code,
    };
    let mut scene = match load_level(&vfs, &config, &config.level_path(level)) {
        Ok(scene) => scene,
        Err(err) => {
            eprintln!("level {} failed: {}", level, err);
            return EXIT_LEVEL;
        }
    };
    scene.normalize_uvs();
    let image = match render_soft::render_scene(&scene, &config.render) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("render failed: {}", err);
            return EXIT_LEVEL;
        }
    };
    let png = match image.encode_png() {
        Ok(png) => png,
        Err(err) => {
            eprintln!("png encode failed: {}", err);
            return EXIT_OUTPUT;
        }
    };
    if let Err(err) = fs::write(out, png) {
        eprintln!("write failed for {}: {}", out.display(), err);
        return EXIT_OUTPUT;
    }
    println!(
        "rendered {} ({} surfaces, {} materials) to {}",
        level,
        scene.surface_count(),
        scene.materials.len(),
        out.display()
    );
    EXIT_SUCCESS
}

fn run_episode(args: &MountArgs) -> i32 {
    let (config, vfs) = match mount(args) {
        Ok(mounted) => mounted,
        Err(code) => return code,
    };
    if !vfs.contains_in_layer(Layer::Level, level_cook::episode::EPISODE_FILE) {
        eprintln!("no episode.jk in the level archives");
        return EXIT_LEVEL;
    }
    let episode = match load_episode(&vfs, &config) {
        Ok(episode) => episode,
        Err(err) => {
            eprintln!("episode failed: {}", err);
            return EXIT_LEVEL;
        }
    };
    println!("episode: {}", episode.title);
    for level in &episode.levels {
        println!(
            "{:<16} {:>6} opaque {:>6} model {:>6} sky {:>4} materials",
            level.name,
            level.scene.opaque.len(),
            level.scene.models.len(),
            level.scene.sky.len(),
            level.scene.materials.len()
        );
    }
    EXIT_SUCCESS
}
