use std::process;

use clap::Parser;

mod cli;
mod commands;
mod exit_codes;
mod logging;
mod output;

fn main() {
    logging::init_tracing();

    let cli = cli::Cli::parse();

    let exit_code = match cli.command {
        cli::Command::List(args) => {
            let mut out = output::make(args.json, output::OutputOptions::default());
            let code = commands::list::run(args, &mut *out);
            out.finish();
            code
        }
        cli::Command::Read(args) => {
            let opts = output::OutputOptions {
                verbose: args.verbose,
                quiet: args.quiet,
            };
            let mut out = output::make(args.json, opts);
            let code = commands::read::run(args, &mut *out);
            out.finish();
            code
        }
        cli::Command::Write(args) => {
            let opts = output::OutputOptions {
                verbose: args.verbose,
                quiet: args.quiet,
            };
            let mut out = output::make(args.json, opts);
            let code = commands::write::run(args, &mut *out);
            out.finish();
            code
        }
        cli::Command::Erase(args) => {
            let opts = output::OutputOptions {
                verbose: args.verbose,
                quiet: args.quiet,
            };
            let mut out = output::make(args.json, opts);
            let code = commands::erase::run(args, &mut *out);
            out.finish();
            code
        }
    };

    process::exit(exit_code);
}
