use std::env;
use std::path::PathBuf;
use std::process::exit;

use strata_hash::{Algorithm, Hash};
use strata_nar::{NarSerializer, VcsExclusion};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: strata nar [-x|--exclude-vcs] [-H ALGO]... [-f hex|base32|base64] PATH";

#[derive(Clone, Copy)]
enum Format {
    Hex,
    Base32,
    Base64,
}

impl Format {
    fn render(self, hash: &Hash) -> String {
        match self {
            Format::Hex => hash.to_hex(),
            Format::Base32 => hash.to_base32(),
            Format::Base64 => hash.to_base64(),
        }
    }
}

fn run_nar(args: Vec<String>) -> i32 {
    let mut algorithms: Vec<Algorithm> = Vec::new();
    let mut format = Format::Hex;
    let mut exclude_vcs = false;
    let mut path: Option<PathBuf> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-x" | "--exclude-vcs" => exclude_vcs = true,
            "-H" | "--hash" => match iter.next() {
                Some(name) => match name.parse::<Algorithm>() {
                    Ok(algorithm) => {
                        if !algorithms.contains(&algorithm) {
                            algorithms.push(algorithm);
                        }
                    }
                    Err(err) => {
                        eprintln!("{err}");
                        return 2;
                    }
                },
                None => {
                    eprintln!("{arg} needs an algorithm name");
                    return 2;
                }
            },
            "-f" | "--format" => match iter.next().as_deref() {
                Some("hex") => format = Format::Hex,
                Some("base32") => format = Format::Base32,
                Some("base64") => format = Format::Base64,
                Some(other) => {
                    eprintln!("unknown digest format {other:?}");
                    return 2;
                }
                None => {
                    eprintln!("{arg} needs a format name");
                    return 2;
                }
            },
            other if path.is_none() && !other.starts_with('-') => {
                path = Some(PathBuf::from(other));
            }
            other => {
                eprintln!("unexpected argument {other:?}\n{USAGE}");
                return 2;
            }
        }
    }

    let Some(path) = path else {
        eprintln!("{USAGE}");
        return 2;
    };
    if algorithms.is_empty() {
        algorithms.push(Algorithm::Sha256);
    }

    let mut serializer = NarSerializer::new(&algorithms);
    if exclude_vcs {
        serializer = serializer.with_exclusion(VcsExclusion::All);
    }

    match serializer.serialize(&path) {
        Ok(digests) => {
            if let [algorithm] = algorithms[..] {
                if let Some(hash) = digests.get(algorithm) {
                    println!("{}", format.render(hash));
                }
            } else {
                for (algorithm, hash) in digests.iter() {
                    println!("{algorithm}:{}", format.render(hash));
                }
            }
            0
        }
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

fn run(mut args: Vec<String>) -> i32 {
    if args.is_empty() {
        eprintln!("{USAGE}");
        return 2;
    }
    let command = args.remove(0);
    match command.as_str() {
        "nar" => run_nar(args),
        other => {
            eprintln!("unknown command {other:?}\n{USAGE}");
            2
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    exit(run(env::args().skip(1).collect()));
}
