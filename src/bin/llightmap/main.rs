//! llightmap CLI - bake lightmaps for JSON scene descriptions.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use llightmap::export::{load_color_image, load_texel_cache, save_color_image, save_scalar_image, save_texel_cache};
use llightmap::{BakeSettings, LightMapper, LogProgress, SceneDesc};

#[cfg(feature = "profile")]
type TraceGuard = Option<tracing_chrome::FlushGuard>;
#[cfg(not(feature = "profile"))]
type TraceGuard = ();

fn main() {
    let args: Vec<String> = env::args().collect();

    // Parse global flags
    let mut level = "info";
    let mut filtered_args: Vec<&str> = Vec::new();
    for arg in &args[1..] {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "error",
            _ => filtered_args.push(arg),
        }
    }
    let _guard = init_tracing(level);

    if filtered_args.is_empty() {
        print_help();
        return;
    }

    let result = match filtered_args[0] {
        "bake" | "b" => BakeArgs::parse(&filtered_args[1..]).and_then(|a| cmd_bake(&a)),
        "defaults" | "d" => cmd_defaults(),
        "version" | "-V" | "--version" => {
            println!("{}", llightmap::version_string());
            Ok(())
        }
        "help" | "h" | "-h" | "--help" => {
            print_help();
            Ok(())
        }
        other => Err(anyhow::anyhow!("unknown command '{other}', see 'llightmap-cli help'")),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// fmt output filtered by `RUST_LOG` or the verbosity flags, plus a chrome
/// trace when `LLIGHTMAP_TRACE=1`.
#[cfg(feature = "profile")]
fn init_tracing(level: &str) -> TraceGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt = tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (chrome, guard) = if env::var("LLIGHTMAP_TRACE").ok().as_deref() == Some("1") {
        let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new().file("trace.json").build();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };
    let _ = tracing_subscriber::registry().with(chrome).with(fmt.with_filter(filter)).try_init();
    guard
}

/// fmt output filtered by `RUST_LOG` or the verbosity flags.
#[cfg(not(feature = "profile"))]
fn init_tracing(level: &str) -> TraceGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let fmt = tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr);
    let _ = tracing_subscriber::registry().with(fmt.with_filter(filter)).try_init();
}

#[derive(Debug, Default)]
struct BakeArgs {
    scene: PathBuf,
    output: PathBuf,
    settings: Option<PathBuf>,
    lightmap: Option<PathBuf>,
    ao: Option<PathBuf>,
    emission: Option<PathBuf>,
    load_cache: Option<PathBuf>,
    save_cache: Option<PathBuf>,
    probes: Option<PathBuf>,
    size: Option<u32>,
}

impl BakeArgs {
    fn parse(args: &[&str]) -> anyhow::Result<Self> {
        let mut out = Self::default();
        let mut positional = Vec::new();
        let mut it = args.iter();
        while let Some(&arg) = it.next() {
            let mut value = || it.next().copied().with_context(|| format!("{arg} needs a value"));
            match arg {
                "-s" | "--settings" => out.settings = Some(value()?.into()),
                "--lightmap" => out.lightmap = Some(value()?.into()),
                "--ao" => out.ao = Some(value()?.into()),
                "--emission" => out.emission = Some(value()?.into()),
                "--load-cache" => out.load_cache = Some(value()?.into()),
                "--save-cache" => out.save_cache = Some(value()?.into()),
                "--probes" => out.probes = Some(value()?.into()),
                "--size" => {
                    let v = value()?;
                    out.size = Some(v.parse().with_context(|| format!("bad size '{v}'"))?);
                }
                flag if flag.starts_with('-') => bail!("unknown option '{flag}'"),
                path => positional.push(PathBuf::from(path)),
            }
        }
        match positional.as_slice() {
            [scene, output] => {
                out.scene = scene.clone();
                out.output = output.clone();
                Ok(out)
            }
            _ => bail!("usage: llightmap-cli bake <scene.json> <output.png|exr> [OPTIONS]"),
        }
    }
}

fn cmd_bake(args: &BakeArgs) -> anyhow::Result<()> {
    let scene = SceneDesc::load(&args.scene).with_context(|| format!("reading scene {}", args.scene.display()))?;
    let mut settings = match &args.settings {
        Some(path) => BakeSettings::load(path).with_context(|| format!("reading settings {}", path.display()))?,
        None => BakeSettings::default(),
    };
    if let Some(size) = args.size {
        settings.width = size;
        settings.height = size;
    }
    if llightmap::export::is_float_path(&args.output) {
        settings.hdr = true;
    }
    if args.probes.is_some() {
        settings.process_probes = true;
    }

    let mut mapper = LightMapper::new(settings);
    if let Some(sky) = &scene.sky {
        let path = resolve(&args.scene, sky);
        let image = load_color_image(&path).with_context(|| format!("reading sky {}", path.display()))?;
        mapper.set_sky(image);
    }
    if let Some(path) = &args.load_cache {
        let maps = load_texel_cache(path).with_context(|| format!("reading texel cache {}", path.display()))?;
        mapper.set_texel_maps(maps);
    }

    let mut progress = LogProgress::new();
    let out = mapper.bake(&scene, &mut progress).context("bake failed")?;

    save_color_image(&args.output, &out.combined).with_context(|| format!("writing {}", args.output.display()))?;
    tracing::info!(path = %args.output.display(), "wrote combined");
    if let Some(path) = &args.lightmap {
        save_color_image(path, &out.lightmap)?;
    }
    if let Some(path) = &args.emission {
        save_color_image(path, &out.emission)?;
    }
    if let Some(path) = &args.ao {
        match &out.ao {
            Some(ao) => save_scalar_image(path, ao)?,
            None => tracing::warn!("bake mode has no AO, {} not written", path.display()),
        }
    }
    if let Some(path) = &args.save_cache {
        save_texel_cache(path, &out.maps)?;
    }
    if let Some(path) = &args.probes {
        match &out.probes {
            Some(probes) => probes.save(path).with_context(|| format!("writing probes {}", path.display()))?,
            None => tracing::warn!("no light probes baked, {} not written", path.display()),
        }
    }
    Ok(())
}

fn cmd_defaults() -> anyhow::Result<()> {
    println!("{}", BakeSettings::default().to_json()?);
    Ok(())
}

/// Paths in a scene file are relative to the scene file.
fn resolve(scene: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    scene.parent().map_or_else(|| path.to_path_buf(), |dir| dir.join(path))
}

fn print_help() {
    println!("llightmap-cli - CPU lightmap baker");
    println!();
    println!("USAGE:");
    println!("    llightmap-cli [OPTIONS] <COMMAND> [ARGS]");
    println!();
    println!("COMMANDS:");
    println!("    b, bake <scene.json> <out>    Bake and write the combined image (.png or .exr)");
    println!("    d, defaults                   Print the default settings as JSON");
    println!("    version                       Show version and tracing backend");
    println!("    h, help                       Show this help");
    println!();
    println!("BAKE OPTIONS:");
    println!("    -s, --settings <file>    Settings JSON (missing fields use defaults)");
    println!("    --size <n>               Override width and height");
    println!("    --lightmap <file>        Also write the direct light image");
    println!("    --ao <file>              Also write the AO image");
    println!("    --emission <file>        Also write the emission image");
    println!("    --load-cache <file>      Reuse texel maps from an earlier bake");
    println!("    --save-cache <file>      Store texel maps for later bakes");
    println!("    --probes <file>          Bake light probes and write them as JSON");
    println!();
    println!("OPTIONS:");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Errors only");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG            Overrides the verbosity flags");
    println!("    LLIGHTMAP_TRACE=1   Write trace.json (feature 'profile')");
    println!();
    println!("EXAMPLES:");
    println!("    llightmap-cli defaults > settings.json");
    println!("    llightmap-cli bake room.json room.png -s settings.json");
    println!("    llightmap-cli -v bake room.json room.exr --ao room_ao.png");
}
