extern crate clap;
extern crate sicxe_tools;

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::{App, Arg};
use sicxe_tools::linker::{link_files, LinkError, LinkOptions};

fn main() {
    let matches = App::new("sicxe_link")
        .about("Combines SIC/XE object modules into one executable module.")
        .arg(
            Arg::with_name("INPUT")
                .help("object module files, control module first")
                .required(true)
                .multiple(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("write the merged module here instead of stdout"),
        )
        .arg(
            Arg::with_name("load")
                .short("l")
                .long("load-address")
                .takes_value(true)
                .help("hex load address for the first module"),
        )
        .arg(
            Arg::with_name("force")
                .short("f")
                .long("force")
                .help("keep going over duplicate or undefined external symbols"),
        )
        .arg(
            Arg::with_name("audit")
                .short("a")
                .long("audit")
                .help("print placed sections, symbols and patches to stderr"),
        )
        .get_matches();

    let inputs: Vec<PathBuf> = matches
        .values_of("INPUT")
        .unwrap()
        .map(PathBuf::from)
        .collect();

    let load_address = matches.value_of("load").map(|s| {
        i32::from_str_radix(s.trim_start_matches("0x"), 16).unwrap_or_else(|_| {
            eprintln!("invalid load address '{}'", s);
            process::exit(2);
        })
    });

    let options = LinkOptions {
        load_address,
        force: matches.is_present("force"),
    };

    let result = match matches.value_of("output") {
        Some(path) => File::create(path)
            .map_err(LinkError::from)
            .and_then(|mut f| link_files(&inputs, &mut f, &options)),
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            link_files(&inputs, &mut lock, &options)
        }
    };

    match result {
        Ok(out) => {
            for diagnostic in &out.diagnostics {
                eprintln!("{}", diagnostic);
            }
            if matches.is_present("audit") {
                eprint!("{}", out.audit);
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
