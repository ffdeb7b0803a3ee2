use clap::{Parser, Subcommand};

use crate::{info::Info, render::Render};

mod archive;
mod info;
mod render;

#[derive(Parser)]
struct Options {
	#[clap(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	Info(Info),
	Render(Render),
}

fn main() {
	env_logger::init();

	let opts: Options = Options::parse();
	match opts.command {
		Command::Info(info) => info::info(info),
		Command::Render(render) => render::render(render),
	}
}
