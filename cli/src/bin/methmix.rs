use deconvolver::{fit, io, simulate, DeconvError, FitConfig, Model};
use std::io::{BufWriter, Write};
use std::path::Path;
#[macro_use]
extern crate log;

fn main() -> std::io::Result<()> {
    let matches = methmix_cli::methmix_commands::methmix_parser().get_matches();
    if let Some((_, sub_m)) = matches.subcommand() {
        let level = match sub_m.get_count("verbose") {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    }
    let result = match matches.subcommand() {
        Some(("deconvolve", sub_m)) => deconvolve(sub_m),
        Some(("simulate", sub_m)) => run_simulate(sub_m),
        _ => unreachable!(),
    };
    if let Err(why) = result {
        eprintln!("error: {}", why);
        std::process::exit(1);
    }
    Ok(())
}

fn get_parsed<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str) -> Option<T> {
    matches
        .get_one::<String>(name)
        .and_then(|value| value.parse().ok())
}

fn set_threads(matches: &clap::ArgMatches) {
    if let Some(threads) = matches
        .get_one("threads")
        .and_then(|num: &String| num.parse().ok())
    {
        debug!("Set Threads\t{}", threads);
        if let Err(why) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            debug!("{:?}", why);
        }
    }
}

/// File stem up to the first dot, so `hu26.llse.tsv` reports as `hu26`.
fn sample_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.split('.').next().unwrap_or(n).to_string())
        .unwrap_or_else(|| path.to_string())
}

fn deconvolve(matches: &clap::ArgMatches) -> Result<(), DeconvError> {
    set_threads(matches);
    let model: Model = matches
        .get_one::<String>("model")
        .map(|m| m.parse())
        .transpose()?
        .unwrap_or(Model::Llse);
    let config = FitConfig {
        p01: get_parsed(matches, "p01").unwrap_or(0.05),
        p11: get_parsed(matches, "p11").unwrap_or(0.95),
        random_inits: matches.get_flag("random_inits"),
        n_trials: get_parsed(matches, "n_trials").unwrap_or(10),
        max_iter: get_parsed(matches, "max_iter").unwrap_or(100),
        seed: get_parsed(matches, "seed").unwrap_or(3490),
        stop_thresh: get_parsed(matches, "stop_thresh").unwrap_or(0.001),
        solver_max_iter: get_parsed(matches, "solver_max_iter").unwrap_or(300),
        min_proportion: get_parsed(matches, "min_proportion").unwrap_or(0.01),
    };
    let atlas_path: &String = matches.get_one("atlas").unwrap();
    let atlas = io::load_atlas(Path::new(atlas_path))?;
    debug!(
        "ATLAS\t{} sites\t{} cell types",
        atlas.coords.len(),
        atlas.cell_types.len()
    );
    let inputs: Vec<&String> = matches.get_many("input").unwrap().collect();
    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
    let mut failures: Vec<(String, DeconvError)> = Vec::new();
    for input in inputs {
        let name = sample_name(input);
        match io::load_joined(&atlas, Path::new(input), &name)
            .and_then(|(joined, sample)| fit(&joined, &sample, model, &config))
        {
            Ok(sigma) => columns.push((name, sigma)),
            Err(why) => {
                warn!("FAILED\t{}\t{}", name, why);
                failures.push((name, why));
            }
        }
    }
    for (name, why) in &failures {
        eprintln!("{}: {}", name, why);
    }
    if columns.is_empty() {
        return Err(failures
            .into_iter()
            .next()
            .map(|(_, why)| why)
            .unwrap_or(DeconvError::EmptyInput {
                sample: "<none>".to_string(),
            }));
    }
    write_proportions(&atlas.cell_types, &columns)?;
    Ok(())
}

fn write_proportions(
    cell_types: &[String],
    columns: &[(String, Vec<f64>)],
) -> Result<(), DeconvError> {
    let stdout = std::io::stdout();
    let mut wtr = BufWriter::new(stdout.lock());
    write!(wtr, "ct")?;
    for (name, _) in columns {
        write!(wtr, "\t{}", name)?;
    }
    writeln!(wtr)?;
    for (k, ct) in cell_types.iter().enumerate() {
        write!(wtr, "{}", ct)?;
        for (_, sigma) in columns {
            write!(wtr, "\t{:.4}", sigma[k])?;
        }
        writeln!(wtr)?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_simulate(matches: &clap::ArgMatches) -> Result<(), DeconvError> {
    let atlas_path: &String = matches.get_one("atlas").unwrap();
    let atlas = io::load_atlas(Path::new(atlas_path))?;
    let sigma_arg: &String = matches.get_one("sigma").unwrap();
    let sigma: Vec<f64> = sigma_arg
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|why| DeconvError::Simulation(format!("bad mixture value: {}", why)))?;
    let config = simulate::SimulateConfig {
        coverage: get_parsed(matches, "coverage").unwrap_or(30.0),
        region_size: get_parsed(matches, "region_size").unwrap_or(10),
        p01: get_parsed(matches, "p01").unwrap_or(0.0),
        p11: get_parsed(matches, "p11").unwrap_or(1.0),
        seed: get_parsed(matches, "seed").unwrap_or(3490),
    };
    let stdout = std::io::stdout();
    let wtr = BufWriter::new(stdout.lock());
    simulate::generate_methylome(&atlas, &sigma, &config, wtr)
}
