use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use colored::*;
use tracing_subscriber::EnvFilter;
use vdif_spectrum::pipeline::{self, SessionReport};
use vdif_spectrum::spectrum::accumulate::Integrator;
use vdif_spectrum::{RateUnknownPolicy, ReceiverConfig, Result, Session, SpectralResult, SpectrumScale};

/// Either one JSON line per spectrum or a CSV integrated spectrum every N spectra
struct Output {
	integrate: Option<usize>,
	integrator: Integrator,
	emitted: usize,
}

impl Output {

	fn emit(&mut self, result:SpectralResult) -> Result<()> {
		self.emitted += 1;
		match self.integrate {
			None => println!("{}", serde_json::to_string(&result)?),
			Some(n) => {
				if self.integrator.add(&result) >= n {
					let count = self.integrator.count();
					for (freq, mag) in self.integrator.frequency_axis().iter().zip(self.integrator.average().iter()) {
						println!("{},{},{}", freq, mag, count);
					}
					self.integrator.reset();
				}
			}
		}
		Ok(())
	}

}

fn build_config(matches:&ArgMatches) -> Result<ReceiverConfig> {
	let mut config = match matches.get_one::<PathBuf>("config") {
		Some(path) => ReceiverConfig::from_json_file(path)?,
		None => ReceiverConfig::default(),
	};

	if let Some(port) = matches.get_one::<u16>("port") { config.port = *port; }
	if let Some(addr) = matches.get_one::<IpAddr>("bind") { config.bind_address = *addr; }
	if let Some(channel) = matches.get_one::<u16>("channel") { config.channel = *channel; }
	if let Some(ms) = matches.get_one::<f64>("window_ms") { config.window_duration_ms = *ms; }
	if let Some(rate) = matches.get_one::<u32>("frame_rate") { config.frame_rate_hint = Some(*rate); }
	if let Some(path) = matches.get_one::<PathBuf>("capture") {
		config.sink_path = Some(path.clone());
		config.capture_enabled = true;
	}
	if matches.get_flag("hold") { config.rate_unknown_policy = RateUnknownPolicy::Hold; }
	match matches.get_one::<String>("scale").map(|s| s.as_str()) {
		Some("magnitude") => config.scale = SpectrumScale::Magnitude,
		Some("decibel")   => config.scale = SpectrumScale::Decibel,
		_ => {},
	}

	config.validate()?;
	Ok(config)
}

fn report_summary(report:&SessionReport) -> Result<()> {
	if let Some(t) = report.timing {
		eprintln!("{}", format!("Frame rate {} [frames/sec], sample rate {} [samples/sec]", t.frame_rate, t.sample_rate).green());
	} else {
		eprintln!("{}", "Frame rate was never learned".yellow());
	}
	eprintln!("{}", serde_json::to_string_pretty(&report.stats)?);
	Ok(())
}

async fn run(matches:ArgMatches) -> Result<()> {
	let config = build_config(&matches)?;
	let mut output = Output{ integrate: matches.get_one::<usize>("integrate").copied().filter(|n| *n > 0),
		integrator: Integrator::new(), emitted: 0 };

	if let Some(path) = matches.get_one::<PathBuf>("replay") {
		eprintln!("Replaying {} on channel {}", path.display(), config.channel);
		let mut failure = None;
		let report = pipeline::replay_file(&config, path, |r| {
			if failure.is_none() {
				failure = output.emit(r).err();
			}
		}).await?;
		if let Some(e) = failure { return Err(e); }
		return report_summary(&report);
	}

	let mut session = Session::start(config.clone()).await?;
	let mut results = session.results().ok_or(vdif_spectrum::Error::StageFailed{ stage: "spectral" })?;
	eprintln!("{}", format!("Listening on {} for thread {}, {} [ms] windows", session.local_addr(), config.channel, config.window_duration_ms).green());

	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				eprintln!("{}", "Stopping".yellow());
				break;
			},
			_ = session.terminated() => break,
			r = results.recv() => match r {
				Some(r) => output.emit(r)?,
				None => break,
			},
		}
	}

	let report = session.stop().await?;
	while let Some(r) = results.recv().await {
		output.emit(r)?;
	}
	eprintln!("{} spectra written", output.emitted);
	report_summary(&report)
}

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_writer(std::io::stderr)
		.init();

	let matches = Command::new("VDIF Spectrum Receiver")
		.version("0.1.0")
		.author("John Stanford (johnwstanford@gmail.com)")
		.about("Receives VDIF frames over UDP and produces windowed FFT spectra for one thread")
		.arg(Arg::new("config")
			.long("config")
			.help("JSON configuration file; command-line options override it")
			.value_parser(value_parser!(PathBuf)))
		.arg(Arg::new("port")
			.short('p').long("port")
			.help("UDP port, defaults to 7100")
			.value_parser(value_parser!(u16)))
		.arg(Arg::new("bind")
			.long("bind")
			.help("Local address, defaults to 0.0.0.0")
			.value_parser(value_parser!(IpAddr)))
		.arg(Arg::new("channel")
			.short('c').long("channel")
			.help("VDIF thread id to process")
			.value_parser(value_parser!(u16)))
		.arg(Arg::new("window_ms")
			.short('w').long("window-ms")
			.help("Window length in milliseconds")
			.value_parser(value_parser!(f64)))
		.arg(Arg::new("capture")
			.long("capture")
			.help("Append every raw datagram to this file")
			.value_parser(value_parser!(PathBuf)))
		.arg(Arg::new("frame_rate")
			.long("frame-rate")
			.help("Known frame rate [frames/sec]; skips learning it from the stream")
			.value_parser(value_parser!(u32)))
		.arg(Arg::new("hold")
			.long("hold")
			.help("Keep frames that arrive before the frame rate is learned instead of dropping them")
			.action(ArgAction::SetTrue))
		.arg(Arg::new("scale")
			.long("scale")
			.value_parser(["magnitude", "decibel"]))
		.arg(Arg::new("integrate")
			.long("integrate")
			.help("Print a non-coherently integrated spectrum as CSV every N spectra")
			.value_parser(value_parser!(usize)))
		.arg(Arg::new("replay")
			.long("replay")
			.help("Process a captured VDIF file instead of listening")
			.value_parser(value_parser!(PathBuf)))
		.get_matches();

	match run(matches).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("{}", format!("Error: {}", e).red());
			ExitCode::FAILURE
		}
	}
}
