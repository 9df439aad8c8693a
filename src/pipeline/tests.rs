use std::collections::VecDeque;
use std::f64::consts::PI;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand_distr::{Distribution, Normal};
use tokio::sync::mpsc;

use super::*;
use crate::config::RateUnknownPolicy;
use crate::spectrum::SpectrumScale;
use crate::timing::epoch::Timestamp;
use crate::vdif::{encode, samples, Frame};

const PAYLOAD_BYTES:usize = 64;
// 2-bit real samples
const SAMPLES_PER_FRAME:usize = PAYLOAD_BYTES * 4;

fn quantize(x:f64) -> u32 {
	if x > 0.5 { 3 } else if x > 0.0 { 2 } else if x > -0.5 { 1 } else { 0 }
}

fn tone_payload(frame_rate:u32, frame_number:u32, tone_hz:f64) -> Vec<u8> {
	let fs = frame_rate as f64 * SAMPLES_PER_FRAME as f64;
	let first = frame_number as usize * SAMPLES_PER_FRAME;
	let codes:Vec<u32> = (first..first + SAMPLES_PER_FRAME)
		.map(|i| quantize((2.0 * PI * tone_hz * i as f64 / fs).cos()))
		.collect();
	samples::pack(&codes, 2)
}

fn datagram(seconds:u32, frame_number:u32, thread_id:u16, payload:Vec<u8>) -> Vec<u8> {
	encode(&Frame{ ref_epoch: 48, seconds_from_epoch: seconds, frame_number, thread_id, bits_per_sample: 2,
		payload, ..Frame::default() }).unwrap()
}

fn config() -> ReceiverConfig {
	ReceiverConfig{ bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST), port: 0, scale: SpectrumScale::Magnitude, ..Default::default() }
}

async fn run_pipeline(config:&ReceiverConfig, datagrams:Vec<Vec<u8>>) -> (Vec<SpectralResult>, Option<StreamTiming>, StatsSnapshot) {
	let (tx, rx) = mpsc::channel(config.raw_queue_depth);
	let mut pipeline = Pipeline::spawn(config, rx);
	let mut results = pipeline.results().unwrap();

	let collector = tokio::spawn(async move {
		let mut all = vec![];
		while let Some(r) = results.recv().await { all.push(r); }
		all
	});

	for d in datagrams {
		tx.send(d).await.unwrap();
	}
	drop(tx);

	let stats = pipeline.stats.clone();
	let timing = pipeline.shutdown().await.unwrap();
	(collector.await.unwrap(), timing, stats.snapshot())
}

#[tokio::test(flavor = "multi_thread")]
async fn hundred_frames_make_two_windows() {
	let config = ReceiverConfig{ window_duration_ms: 50.0, frame_rate_hint: Some(1000), ..config() };
	let datagrams = (0..100).map(|n| datagram(10, n, 0, tone_payload(1000, n, 16_000.0))).collect();

	let (results, timing, stats) = run_pipeline(&config, datagrams).await;

	assert_eq!(results.len(), 2);
	assert_eq!(results[0].frame_count, 50);
	assert_eq!(results[1].frame_count, 50);
	assert_eq!(results[0].len(), 50 * SAMPLES_PER_FRAME);
	assert_eq!(results[0].window_start_time.to_string(), "2024-01-01T00:00:10Z");
	assert_eq!(results[1].window_start_time.to_string(), "2024-01-01T00:00:10.050Z");
	assert_eq!(timing.unwrap().sample_rate, 256_000.0);
	assert_eq!(stats.windows_flushed, 2);
	assert_eq!(stats.spectra_produced, 2);

	// The tone shows up as the strongest positive-frequency bin
	let r = &results[0];
	let peak = (r.len() / 2..r.len()).max_by(|a, b| r.magnitude[*a].partial_cmp(&r.magnitude[*b]).unwrap()).unwrap();
	assert!((r.frequency_axis[peak] - 16_000.0).abs() < 1e-6);
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_is_learned_from_the_stream() {
	let config = ReceiverConfig{ window_duration_ms: 50.0, ..config() };
	let mut datagrams:Vec<Vec<u8>> = (0..1000).map(|n| datagram(10, n, 0, vec![0u8; PAYLOAD_BYTES])).collect();
	datagrams.extend((0..100).map(|n| datagram(11, n, 0, vec![0u8; PAYLOAD_BYTES])));

	let (results, timing, stats) = run_pipeline(&config, datagrams).await;

	assert_eq!(timing.unwrap().frame_rate, 1000);
	assert_eq!(stats.rate_unknown_dropped, 1000);
	assert_eq!(results.len(), 2);
	assert!(results.iter().all(|r| r.frame_count == 50));
	assert_eq!(results[0].window_start_time.to_string(), "2024-01-01T00:00:11Z");
}

#[tokio::test(flavor = "multi_thread")]
async fn other_threads_and_garbage_do_not_disturb_windows() {
	let config = ReceiverConfig{ channel: 1, window_duration_ms: 10.0, frame_rate_hint: Some(100), ..config() };
	let normal = Normal::new(0.0, 1.0).unwrap();
	let mut rng = rand::thread_rng();

	let mut datagrams = vec![];
	for n in 0..4 {
		let noise:Vec<u32> = (0..SAMPLES_PER_FRAME).map(|_| quantize(normal.sample(&mut rng))).collect();
		datagrams.push(datagram(0, n, 0, vec![0xFF; PAYLOAD_BYTES]));
		datagrams.push(datagram(0, n, 1, samples::pack(&noise, 2)));
		datagrams.push(vec![0xAB; 20]);
	}

	let (results, _, stats) = run_pipeline(&config, datagrams).await;

	assert_eq!(stats.filtered, 4);
	assert_eq!(stats.malformed, 4);
	assert_eq!(results.len(), 4);
	assert!(results.iter().all(|r| r.frame_count == 1));
	assert_eq!(results[0].window_start_time, Timestamp::from_civil(2024, 1, 1, 0, 0, 0).unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn hold_policy_keeps_the_learning_second() {
	let config = ReceiverConfig{ window_duration_ms: 500.0, rate_unknown_policy: RateUnknownPolicy::Hold, ..config() };
	let mut datagrams:Vec<Vec<u8>> = (0..10).map(|n| datagram(0, n, 0, vec![0u8; PAYLOAD_BYTES])).collect();
	datagrams.push(datagram(1, 0, 0, vec![0u8; PAYLOAD_BYTES]));

	let (results, timing, stats) = run_pipeline(&config, datagrams).await;

	assert_eq!(timing.unwrap().frame_rate, 10);
	assert_eq!(stats.rate_unknown_dropped, 0);
	let counts:Vec<usize> = results.iter().map(|r| r.frame_count).collect();
	assert_eq!(counts, vec![5, 5, 1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_consumer_sees_the_newest_results() {
	let config = ReceiverConfig{ window_duration_ms: 1.0, frame_rate_hint: Some(1000), result_queue_depth: 2,
		flush_queue_depth: 64, ..config() };
	let (tx, rx) = mpsc::channel(64);
	let mut pipeline = Pipeline::spawn(&config, rx);
	let mut results = pipeline.results().unwrap();

	for n in 0..20 {
		tx.send(datagram(0, n, 0, vec![0u8; PAYLOAD_BYTES])).await.unwrap();
	}
	drop(tx);
	let stats = pipeline.stats.clone();
	pipeline.shutdown().await.unwrap();

	let mut seen = vec![];
	while let Some(r) = results.recv().await { seen.push(r); }

	let snap = stats.snapshot();
	assert!(seen.len() <= 2);
	assert_eq!(seen.len() as u64 + snap.results_lagged, snap.spectra_produced);
	// The final window always survives
	assert_eq!(seen.last().unwrap().window_start_time.to_string(), "2024-01-01T00:00:00.019Z");
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
	fn write(&mut self, buf:&[u8]) -> io::Result<usize> {
		self.0.lock().unwrap().extend_from_slice(buf);
		Ok(buf.len())
	}
	fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

async fn wait_for_datagrams(session:&Session, n:u64) {
	for _ in 0..500 {
		if session.stats().datagrams_received >= n { return; }
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("only {} of {} datagrams arrived", session.stats().datagrams_received, n);
}

#[tokio::test(flavor = "multi_thread")]
async fn udp_session_receives_and_captures() {
	let capture = SharedBuffer::default();
	let config = ReceiverConfig{ window_duration_ms: 5.0, frame_rate_hint: Some(1000), capture_enabled: true, ..config() };
	let mut session = Session::start_with_writer(config, Box::new(capture.clone())).await.unwrap();
	let mut results = session.results().unwrap();
	assert!(session.capture_enabled());

	let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
	let mut sent:Vec<u8> = vec![];
	for n in 0..20 {
		let d = datagram(0, n, 0, vec![0x55; PAYLOAD_BYTES]);
		sender.send_to(&d, session.local_addr()).unwrap();
		sent.extend_from_slice(&d);
	}
	wait_for_datagrams(&session, 20).await;

	let report = session.stop().await.unwrap();
	let mut seen = vec![];
	while let Some(r) = results.recv().await { seen.push(r); }

	assert_eq!(report.stats.datagrams_received, 20);
	assert_eq!(report.stats.captured_bytes, sent.len() as u64);
	assert_eq!(*capture.0.lock().unwrap(), sent);
	assert_eq!(report.timing.unwrap().frame_rate, 1000);
	let counts:Vec<usize> = seen.iter().map(|r| r.frame_count).collect();
	assert_eq!(counts, vec![5, 5, 5, 5]);
}

#[tokio::test(flavor = "multi_thread")]
async fn capture_toggle_is_honoured() {
	let capture = SharedBuffer::default();
	let mut session = Session::start_with_writer(config(), Box::new(capture.clone())).await.unwrap();
	drop(session.results());

	let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
	let first = datagram(0, 0, 0, vec![1; PAYLOAD_BYTES]);
	sender.send_to(&first, session.local_addr()).unwrap();
	wait_for_datagrams(&session, 1).await;

	assert!(session.set_capture(true));
	let second = datagram(0, 1, 0, vec![2; PAYLOAD_BYTES]);
	sender.send_to(&second, session.local_addr()).unwrap();
	wait_for_datagrams(&session, 2).await;

	let report = session.stop().await.unwrap();
	assert_eq!(report.stats.captured_bytes, second.len() as u64);
	assert_eq!(*capture.0.lock().unwrap(), second);
}

#[tokio::test(flavor = "multi_thread")]
async fn restart_begins_with_fresh_timing() {
	let sender = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();

	let mut first = Session::start(config()).await.unwrap();
	drop(first.results());
	for (s, n) in (0..10).map(|n| (0, n)).chain((0..3).map(|n| (1, n))) {
		sender.send_to(&datagram(s, n, 0, vec![0; PAYLOAD_BYTES]), first.local_addr()).unwrap();
	}
	wait_for_datagrams(&first, 13).await;
	let report = first.stop().await.unwrap();
	assert_eq!(report.timing.unwrap().frame_rate, 10);

	// Same frame numbers as the end of the old stream: nothing learned yet
	let mut second = Session::start(config()).await.unwrap();
	drop(second.results());
	for n in 3..6 {
		sender.send_to(&datagram(2, n, 0, vec![0; PAYLOAD_BYTES]), second.local_addr()).unwrap();
	}
	wait_for_datagrams(&second, 3).await;
	let report = second.stop().await.unwrap();
	assert!(report.timing.is_none());
	assert_eq!(report.stats.rate_unknown_dropped, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn bind_failure_is_reported_at_start() {
	let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
	let port = taken.local_addr().unwrap().port();
	let config = ReceiverConfig{ port, ..config() };
	assert!(matches!(Session::start(config).await, Err(Error::Bind{ .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn unwritable_sink_is_reported_at_start() {
	let config = ReceiverConfig{ sink_path: Some("/nonexistent-dir/capture.vdif".into()), ..config() };
	assert!(matches!(Session::start(config).await, Err(Error::Sink{ .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_reproduces_live_windows() {
	let config = ReceiverConfig{ window_duration_ms: 50.0, frame_rate_hint: Some(1000), flush_queue_depth: 1, ..config() };
	let mut stream:Vec<u8> = vec![];
	for n in 0..200 {
		stream.extend(datagram(10, n, 0, tone_payload(1000, n, 8_000.0)));
	}

	let mut seen = vec![];
	let report = replay(&config, io::Cursor::new(stream), |r| seen.push(r)).await.unwrap();

	assert_eq!(report.stats.datagrams_received, 200);
	assert_eq!(report.stats.flushes_dropped, 0);
	assert_eq!(seen.len(), 4);
	assert!(seen.iter().all(|r| r.frame_count == 50));
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_waits_for_a_slow_consumer() {
	let config = ReceiverConfig{ window_duration_ms: 1.0, frame_rate_hint: Some(1000), result_queue_depth: 2,
		flush_queue_depth: 1, ..config() };
	let mut stream:Vec<u8> = vec![];
	for n in 0..200 {
		stream.extend(datagram(0, n, 0, vec![0u8; PAYLOAD_BYTES]));
	}

	let mut seen:Vec<SpectralResult> = vec![];
	let report = replay(&config, io::Cursor::new(stream), |r| {
		std::thread::sleep(Duration::from_millis(1));
		seen.push(r);
	}).await.unwrap();

	assert_eq!(report.stats.windows_flushed, 200);
	assert_eq!(report.stats.spectra_produced, 200);
	assert_eq!(report.stats.results_lagged, 0);
	assert_eq!(report.stats.flushes_dropped, 0);
	assert_eq!(seen.len(), 200);
	assert!(seen.windows(2).all(|w| w[0].window_start_time < w[1].window_start_time));
}

/// Hands out scripted datagrams, then fails the way a vanished interface does.
struct ScriptedSource {
	datagrams: VecDeque<Vec<u8>>,
}

#[async_trait::async_trait]
impl DatagramSource for ScriptedSource {
	async fn recv_datagram(&mut self, buf:&mut [u8]) -> io::Result<(usize, SocketAddr)> {
		match self.datagrams.pop_front() {
			Some(d) => {
				buf[..d.len()].copy_from_slice(&d);
				Ok((d.len(), SocketAddr::from((Ipv4Addr::LOCALHOST, 9))))
			},
			None => Err(io::Error::new(io::ErrorKind::Other, "network is down")),
		}
	}
}

#[tokio::test(flavor = "multi_thread")]
async fn socket_failure_ends_the_session() {
	let config = ReceiverConfig{ window_duration_ms: 5.0, frame_rate_hint: Some(1000), ..config() };
	let datagrams = (0..10).map(|n| datagram(0, n, 0, vec![0u8; PAYLOAD_BYTES])).collect();
	let capture = Arc::new(AtomicBool::new(false));
	let mut session = Session::launch(config, ScriptedSource{ datagrams }, SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
		CaptureSink::none(capture.clone()), capture);
	let mut results = session.results().unwrap();

	tokio::time::timeout(Duration::from_secs(5), session.terminated()).await
		.expect("session did not notice the socket failure");

	let stopped = tokio::time::timeout(Duration::from_secs(5), session.stop()).await
		.expect("stages did not shut down");
	assert!(matches!(stopped, Err(Error::SocketClosed)));

	// Everything received before the failure still made it through, then the queue closed
	let mut seen = vec![];
	while let Some(r) = results.recv().await { seen.push(r); }
	let counts:Vec<usize> = seen.iter().map(|r| r.frame_count).collect();
	assert_eq!(counts, vec![5, 5]);
}
