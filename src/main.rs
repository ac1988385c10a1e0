use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, bail};
use minipy::evaluator::{Evaluator, StdoutConductor};
use minipy::module::NullLoader;
use minipy::runtime::context::{InputSource, Options};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut options = Options::default();
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--step-limit" | "-s" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing value after {arg}"))?;
                options.step_limit = value
                    .parse()
                    .with_context(|| format!("Parsing step limit '{value}'"))?;
            }
            "--prelude" => {
                options.is_prelude = true;
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let mut evaluator = Evaluator::new(StdoutConductor, NullLoader, options);
    evaluator.context_mut().input = InputSource::Stdin;
    evaluator.start(&source);
    Ok(())
}
