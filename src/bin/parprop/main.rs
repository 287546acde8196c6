#[macro_use]
extern crate clap;

use std::fmt::Debug;
use std::path::Path;
use std::process::exit;
use std::str::FromStr;

use num_traits::Float;

use parprop::{ApBuilder, HiApBuilder, MatrixSource, NegEuclidean, Preference};

use crate::ops::{display_hierarchical, display_results, from_file};

mod ops;

struct Opts {
    input: String,
    precalculated: bool,
    delimiter: String,
    preference: Option<f64>,
    iterations: usize,
    damping: f64,
    threads: usize,
    splits: Option<usize>,
    workers: usize,
    wap_iterations: usize,
    seed: Option<u64>,
}

fn main() {
    env_logger::init();
    let matches = clap_app!(parprop =>
        (version: "0.1.0")
        (about: "Parallel and Hierarchical Affinity Propagation")
        (@arg INPUT: -i --input +takes_value +required "Path to input file")
        (@arg PRECALC: -x --precalculated "Input file holds a precalculated similarity matrix")
        (@arg DELIM: -l --delimiter +takes_value "Column delimiter, default=tab")
        (@arg PREF: -p --preference +takes_value +allow_hyphen_values "Preference value, default=median pairwise similarity")
        (@arg ITER: -m --iterations +takes_value "Number of iterations, default=100")
        (@arg DAMPING: -d --damping +takes_value "Damping value in range [0, 1), default=0.5")
        (@arg THREADS: -t --threads +takes_value "Number of worker threads, default=available cores")
        (@arg PRECISION: -r --precision +takes_value "Set f32 or f64 precision, default=f32")
        (@arg SPLITS: -s --splits +takes_value "Hierarchical mode: number of subsets")
        (@arg WORKERS: -w --workers +takes_value "Hierarchical mode: subset workers, default=1")
        (@arg WAP_ITER: -W --wap_iterations +takes_value "Hierarchical mode: merge-round iterations, default=100")
        (@arg SEED: -S --seed +takes_value "Hierarchical mode: shuffle seed")
    )
    .get_matches();

    let input = matches.value_of("INPUT").unwrap().to_string();
    if !Path::new(&input).exists() {
        eprintln!("Unable to locate input file {}", input);
        exit(1);
    }
    let iterations = matches
        .value_of("ITER")
        .unwrap_or("100")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse iterations");
            exit(1);
        });
    let threads = matches
        .value_of("THREADS")
        .unwrap_or("0")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse threads");
            exit(1);
        });
    let damping = matches
        .value_of("DAMPING")
        .unwrap_or("0.5")
        .parse::<f64>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse damping");
            exit(1);
        });
    if damping < 0. || damping >= 1. {
        eprintln!("Damping must be in range [0, 1)");
        exit(2);
    }
    let preference = matches.value_of("PREF").map(|p| {
        p.parse::<f64>().unwrap_or_else(|_| {
            eprintln!("Unable to parse preference");
            exit(1);
        })
    });
    let splits = matches.value_of("SPLITS").map(|s| {
        s.parse::<usize>().unwrap_or_else(|_| {
            eprintln!("Unable to parse splits");
            exit(1);
        })
    });
    let workers = matches
        .value_of("WORKERS")
        .unwrap_or("1")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse workers");
            exit(1);
        });
    let wap_iterations = matches
        .value_of("WAP_ITER")
        .unwrap_or("100")
        .parse::<usize>()
        .unwrap_or_else(|_| {
            eprintln!("Unable to parse wap_iterations");
            exit(1);
        });
    let seed = matches.value_of("SEED").map(|s| {
        s.parse::<u64>().unwrap_or_else(|_| {
            eprintln!("Unable to parse seed");
            exit(1);
        })
    });
    if iterations < 1 || wap_iterations < 1 || workers < 1 || splits == Some(0) {
        eprintln!("Improper parameter set!");
        exit(2);
    }

    let opts = Opts {
        input,
        precalculated: matches.is_present("PRECALC"),
        delimiter: matches.value_of("DELIM").unwrap_or("\t").to_string(),
        preference,
        iterations,
        damping,
        threads,
        splits,
        workers,
        wap_iterations,
        seed,
    };
    match matches.value_of("PRECISION").unwrap_or("f32") {
        "f64" => run::<f64>(&opts),
        _ => run::<f32>(&opts),
    }
}

fn run<F>(opts: &Opts)
where
    F: Float + Send + Sync + FromStr + Default,
    <F as FromStr>::Err: Debug,
{
    let loaded = from_file::<F>(
        Path::new(&opts.input).to_path_buf(),
        &opts.delimiter,
        opts.precalculated,
    );
    let (data, labels) = loaded.unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(1);
    });
    let damping = F::from(opts.damping).unwrap();

    if let Some(splits) = opts.splits {
        if opts.precalculated {
            eprintln!("Hierarchical mode requires point input, not a precalculated matrix");
            exit(2);
        }
        let mut builder = HiApBuilder::new()
            .splits(splits)
            .workers(opts.workers)
            .level1_iters(opts.iterations)
            .level2_iters(opts.wap_iterations)
            .damping(damping);
        if opts.threads > 0 {
            builder = builder.threads_per_worker(opts.threads);
        }
        if let Some(seed) = opts.seed {
            builder = builder.seed(seed);
        }
        let result = builder
            .build()
            .and_then(|hiap| hiap.run(&data, &NegEuclidean::default()));
        match result {
            Ok(clustering) => display_hierarchical(&clustering, &labels),
            Err(e) => {
                eprintln!("{}", e);
                exit(1);
            }
        }
        return;
    }

    let source = if opts.precalculated {
        match opts.preference {
            Some(p) => MatrixSource::with_preference(
                data,
                Preference::Value(F::from(p).unwrap()),
            ),
            None => MatrixSource::new(data),
        }
    } else {
        let preference = match opts.preference {
            Some(p) => Preference::Value(F::from(p).unwrap()),
            None => Preference::Median,
        };
        MatrixSource::from_points(&data, &NegEuclidean::default(), preference)
    };
    let source = source.unwrap_or_else(|e| {
        eprintln!("{}", e);
        exit(1);
    });

    let mut builder = ApBuilder::new().damping(damping);
    if opts.threads > 0 {
        builder = builder.threads(opts.threads);
    }
    let outcome = builder.build(&source).and_then(|mut ap| {
        ap.run(opts.iterations)?;
        display_results(ap.assignment(), &labels);
        Ok(())
    });
    if let Err(e) = outcome {
        eprintln!("{}", e);
        exit(1);
    }
}
