/*!
Polls the configured source and archives snapshots into day files.

The binary only archives. It does not serve the in-memory buffer; the
`BufferView` of the runtime is available to code embedding the library.
*/
use std::path::PathBuf;

use env_logger;

use structopt::StructOpt;

use meter_archive::runtime;

#[derive(Debug, StructOpt)]
#[structopt(name = "meter_archive", about = "Archive telemetry snapshots into daily CSV files")]
struct Opt {
	/// Configuration file
	#[structopt(parse(from_os_str), default_value = "config.toml")]
	config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let opt = Opt::from_args();
	let config_s = std::fs::read_to_string(&opt.config)?;
	let config: runtime::Config = toml::from_str(&config_s)?;
	let runtime = config.build()?;
	runtime.run().await;
	Ok(())
}
