use clap::{Arg, ArgAction, Command};

fn verbose_arg() -> Arg {
    Arg::new("verbose")
        .short('v')
        .action(ArgAction::Count)
        .help("Debug mode")
}

fn atlas_arg() -> Arg {
    Arg::new("atlas")
        .short('a')
        .long("atlas")
        .value_name("TSV")
        .required(true)
        .help("Reference atlas, tab separated, one column per cell type.")
}

fn subcommand_deconvolve() -> Command {
    Command::new("deconvolve")
        .version("0.1")
        .about("Estimate cell type proportions of one or more methylomes.")
        .arg(verbose_arg())
        .arg(atlas_arg())
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .default_value("llse")
                .help("Deconvolution model. null, nnls, llsp, llse, or mmse."),
        )
        .arg(
            Arg::new("p01")
                .long("p01")
                .default_value("0.05")
                .help("Probability an unmodified base is called modified."),
        )
        .arg(
            Arg::new("p11")
                .long("p11")
                .default_value("0.95")
                .help("Probability a modified base is called modified."),
        )
        .arg(
            Arg::new("random_inits")
                .long("random_inits")
                .action(ArgAction::SetTrue)
                .help("Restart the optimizer from random points on the simplex."),
        )
        .arg(
            Arg::new("n_trials")
                .long("n_trials")
                .default_value("10")
                .help("Number of random restarts."),
        )
        .arg(
            Arg::new("max_iter")
                .long("max_iter")
                .default_value("100")
                .help("Iteration cap per optimizer run."),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .default_value("3490")
                .help("Seed for the random restarts."),
        )
        .arg(
            Arg::new("stop_thresh")
                .long("stop_thresh")
                .default_value("0.001")
                .help("Convergence threshold for the mmse solver, in percent."),
        )
        .arg(
            Arg::new("solver_max_iter")
                .long("solver_max_iter")
                .default_value("300")
                .help("Iteration cap for the mmse solver."),
        )
        .arg(
            Arg::new("min_proportion")
                .long("min_proportion")
                .default_value("0.01")
                .help("mmse proportions below this are zeroed."),
        )
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .default_value("1")
                .help("Number of threads."),
        )
        .arg(
            Arg::new("input")
                .value_name("METHYLOME")
                .num_args(1..)
                .required(true)
                .help("Methylome TSV files, one per sample."),
        )
}

fn subcommand_simulate() -> Command {
    Command::new("simulate")
        .version("0.1")
        .about("Simulate a mixed methylome from an atlas and known proportions.")
        .arg(verbose_arg())
        .arg(atlas_arg())
        .arg(
            Arg::new("sigma")
                .short('s')
                .long("sigma")
                .required(true)
                .help("Comma separated mixture proportions, one per atlas cell type."),
        )
        .arg(
            Arg::new("coverage")
                .long("coverage")
                .default_value("30")
                .help("Mean reads per atlas site."),
        )
        .arg(
            Arg::new("region_size")
                .long("region_size")
                .default_value("10")
                .help("Modification calls per read."),
        )
        .arg(
            Arg::new("p01")
                .long("p01")
                .default_value("0.0")
                .help("Simulated false positive call rate."),
        )
        .arg(
            Arg::new("p11")
                .long("p11")
                .default_value("1.0")
                .help("Simulated true positive call rate."),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .default_value("3490")
                .help("Random seed."),
        )
}

pub fn methmix_parser() -> Command {
    Command::new("methmix")
        .version("0.1")
        .about("Cell type deconvolution of methylomes against a reference atlas.")
        .arg_required_else_help(true)
        .subcommand(subcommand_deconvolve())
        .subcommand(subcommand_simulate())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deconvolve_defaults() {
        let matches = methmix_parser()
            .try_get_matches_from(["methmix", "deconvolve", "-a", "atlas.tsv", "s1.tsv"])
            .unwrap();
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "deconvolve");
        assert_eq!(sub.get_one::<String>("model").unwrap(), "llse");
        assert_eq!(sub.get_one::<String>("p01").unwrap(), "0.05");
        assert!(!sub.get_flag("random_inits"));
        let inputs: Vec<&String> = sub.get_many("input").unwrap().collect();
        assert_eq!(inputs, ["s1.tsv"]);
    }

    #[test]
    fn deconvolve_accepts_many_inputs() {
        let matches = methmix_parser()
            .try_get_matches_from([
                "methmix",
                "deconvolve",
                "-a",
                "atlas.tsv",
                "-m",
                "nnls",
                "a.tsv",
                "b.tsv",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        let inputs: Vec<&String> = sub.get_many("input").unwrap().collect();
        assert_eq!(inputs.len(), 2);
    }

    #[test]
    fn simulate_requires_sigma() {
        assert!(methmix_parser()
            .try_get_matches_from(["methmix", "simulate", "-a", "atlas.tsv"])
            .is_err());
    }

    #[test]
    fn verbose_counts_occurrences() {
        let matches = methmix_parser()
            .try_get_matches_from(["methmix", "deconvolve", "-vv", "-a", "a.tsv", "x.tsv"])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_count("verbose"), 2);
    }
}
