use msgwire_frame::type_hash;

use crate::cmd::HashArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_hashes, HashOutput, OutputFormat};

pub fn run(args: HashArgs, format: OutputFormat) -> CliResult<i32> {
    print_hashes(&hash_rows(&args.names), format);
    Ok(SUCCESS)
}

fn hash_rows(names: &[String]) -> Vec<HashOutput> {
    names
        .iter()
        .map(|name| {
            let type_id = type_hash(name);
            HashOutput {
                name: name.clone(),
                type_id,
                hex: format!("{type_id:#010x}"),
            }
        })
        .collect()
}
