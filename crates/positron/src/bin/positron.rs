//! Command-line entry point: compile a script file and execute it.

use std::fs;
use std::path::PathBuf;
use std::process;

use structopt::StructOpt;

use positron::{compile, Heap, Obj, Vm};

#[derive(StructOpt, Debug)]
#[structopt(name = "positron", about = "The Positron scripting language")]
struct Options {
    #[structopt(
        short = "d",
        long = "debug",
        help = "Dump disassembly and trace each executed instruction"
    )]
    debug: bool,

    #[structopt(parse(from_os_str), help = "Positron source file to run")]
    path: PathBuf,
}

fn main() {
    let options = Options::from_args();

    let source = match fs::read_to_string(&options.path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("positron: {}: {}", options.path.display(), e);
            process::exit(74);
        }
    };
    let name = options.path.display().to_string();

    let mut heap = Heap::new();
    let script = match compile(&source, &name, &mut heap) {
        Ok(script) => script,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(65);
        }
    };

    if options.debug {
        // Every function in the heap, the script included.
        for (_, obj) in heap.iter() {
            if let Obj::Function(f) = obj {
                let func_name = heap.as_str(f.name);
                eprint!("{}", f.block.disassemble(func_name, &heap));
            }
        }
    }

    let mut stdout = std::io::stdout();
    let result = Vm::new(&mut heap, &mut stdout)
        .with_trace(options.debug)
        .interpret(script);
    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(70);
        }
    }
}
