use std::{fmt::Display, path::PathBuf};

use clap::Args;

use crate::archive;

#[derive(Args)]
/// Inspect a local tile archive.
pub struct Info {
	input: PathBuf,
}

struct Size(u64);

impl Display for Size {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		let size = self.0;
		if size < 1000 {
			write!(f, "{} B", size)
		} else if size < 1000 * 1000 {
			write!(f, "{:.2} KB", size as f64 / 1000.0)
		} else if size < 1000 * 1000 * 1000 {
			write!(f, "{:.2} MiB", size as f64 / 1000.0 / 1000.0)
		} else {
			write!(f, "{:.2} GiB", size as f64 / 1000.0 / 1000.0 / 1000.0)
		}
	}
}

pub fn info(info: Info) {
	let (total_bytes, counts) = match archive::scan(&info.input) {
		Ok(x) => x,
		Err(err) => {
			eprintln!("archive could not be read: {}", err);
			return;
		},
	};

	println!("Archive");
	println!("  Path: {}", info.input.display());
	println!("  Total size: {}", Size(total_bytes));

	println!();

	println!("Zoom levels");
	for (z, tile_count) in counts {
		println!("  z{}: {} tiles", z, tile_count);
	}
}
