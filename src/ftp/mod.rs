/*!
# FTP upload of day files

A blocking client for one upload: connect, log in, change into the base
path, make sure the year directory exists, store the day file, quit. Every
read and write on the control and data sockets is bounded by the target's
timeout, the greeting included.
*/
use std::fmt;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, info};

use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use crate::engine::Upload;

pub const DEFAULT_PORT: u16 = 21;

#[derive(Clone)]
pub struct Target {
	pub host: String,
	pub port: u16,
	pub user: String,
	pub password: String,
	/// Base directory on the server; empty for the login directory.
	pub path: String,
	pub timeout: Duration,
}

impl fmt::Debug for Target {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Target")
			.field("host", &self.host)
			.field("port", &self.port)
			.field("user", &self.user)
			.field("path", &self.path)
			.field("timeout", &self.timeout)
			.finish()
	}
}

impl Target {
	fn resolve(&self) -> Result<SocketAddr, Error> {
		let mut addrs = match (&self.host[..], self.port).to_socket_addrs() {
			Ok(v) => v,
			Err(e) => return Err(Error::Resolve(e)),
		};
		match addrs.next() {
			Some(addr) => Ok(addr),
			None => Err(Error::Resolve(io::Error::new(
				io::ErrorKind::NotFound,
				format!("no address for {:?}", self.host),
			))),
		}
	}
}

#[derive(Debug)]
pub enum Error {
	Resolve(io::Error),
	Connect(FtpError),
	Socket(io::Error),
	Login(FtpError),
	Directory{path: String, error: FtpError},
	Transfer(FtpError),
	Data(io::Error),
	Timeout(Duration),
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Resolve(e) => write!(f, "failed to resolve server: {}", e),
			Self::Connect(e) => write!(f, "failed to connect: {}", e),
			Self::Socket(e) => write!(f, "failed to configure socket: {}", e),
			Self::Login(e) => write!(f, "login failed: {}", e),
			Self::Directory{path, error} => write!(f, "cannot enter {:?}: {}", path, error),
			Self::Transfer(e) => write!(f, "transfer failed: {}", e),
			Self::Data(e) => write!(f, "data connection failed: {}", e),
			Self::Timeout(t) => write!(f, "gave up after {:?}", t),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Resolve(e) | Self::Socket(e) | Self::Data(e) => Some(e),
			Self::Connect(e) | Self::Login(e) | Self::Transfer(e) => Some(e),
			Self::Directory{error, ..} => Some(error),
			Self::Timeout(_) => None,
		}
	}
}

fn enter(stream: &mut FtpStream, path: &str) -> Result<(), Error> {
	match stream.cwd(path) {
		Ok(()) => Ok(()),
		Err(error) => Err(Error::Directory{path: path.into(), error}),
	}
}

/// Store `upload` as `<path>/<YYYY>/<YYYY-MM-DD>.csv`, replacing what is there.
pub fn upload(target: &Target, upload: &Upload) -> Result<(), Error> {
	let t0 = Instant::now();
	let addr = target.resolve()?;
	let socket = match TcpStream::connect_timeout(&addr, target.timeout) {
		Ok(v) => v,
		Err(e) => return Err(Error::Connect(FtpError::ConnectionError(e))),
	};
	// the greeting is read inside connect_with_stream, so the socket must be
	// bounded before that
	socket.set_read_timeout(Some(target.timeout)).map_err(Error::Socket)?;
	socket.set_write_timeout(Some(target.timeout)).map_err(Error::Socket)?;
	let mut stream = FtpStream::connect_with_stream(socket).map_err(Error::Connect)?;
	stream.login(&target.user[..], &target.password[..]).map_err(Error::Login)?;

	if !target.path.is_empty() {
		enter(&mut stream, &target.path)?;
	}
	let year = upload.year();
	match stream.mkdir(&year[..]) {
		Ok(()) => debug!("created {:?} on {}", year, target.host),
		// most servers answer 550 if the directory exists; entering it below
		// tells the two cases apart
		Err(FtpError::UnexpectedResponse(_)) => (),
		Err(error) => return Err(Error::Directory{path: year, error}),
	};
	enter(&mut stream, &year)?;

	let file_name = upload.file_name();
	stream.transfer_type(FileType::Binary).map_err(Error::Transfer)?;
	let mut data = stream.put_with_stream(&file_name[..]).map_err(Error::Transfer)?;
	let written = data.get_ref().set_write_timeout(Some(target.timeout))
		.and_then(|()| data.write_all(upload.content.as_bytes()));
	if let Err(e) = written {
		return Err(Error::Data(e));
	}
	stream.finalize_put_stream(data).map_err(Error::Transfer)?;
	let nbytes = upload.content.len();
	if let Err(e) = stream.quit() {
		debug!("ignoring failed QUIT after upload: {}", e);
	}
	info!("ftp upload of {} ({} bytes) done in {:?}", file_name, nbytes, t0.elapsed());
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::io::{BufRead, BufReader, Read};
	use std::net::TcpListener;
	use std::sync::{mpsc, Arc};
	use std::thread;

	use chrono::NaiveDate;

	/// Minimal passive-mode FTP server for a single session.
	///
	/// Answers MKD with `mkd` and CWD into the year directory with `cwd_year`;
	/// everything else succeeds. Returns the received commands and the bytes
	/// stored.
	fn serve(listener: TcpListener, mkd: &'static str, cwd_year: &'static str) -> thread::JoinHandle<(Vec<String>, Vec<u8>)> {
		thread::spawn(move || {
			let (control, _) = listener.accept().unwrap();
			let mut reader = BufReader::new(control.try_clone().unwrap());
			let mut out = control;
			let mut reply = move |line: &str| {
				out.write_all(format!("{}\r\n", line).as_bytes()).unwrap();
			};
			reply("220 ready");

			let mut commands = Vec::new();
			let mut stored = Vec::new();
			let mut passive: Option<TcpListener> = None;
			loop {
				let mut line = String::new();
				if reader.read_line(&mut line).unwrap() == 0 {
					break;
				}
				let line = line.trim_end().to_string();
				commands.push(line.clone());
				match line.split(' ').next().unwrap_or("") {
					"USER" => reply("331 password required"),
					"PASS" => reply("230 logged in"),
					"CWD" if line == "CWD 2022" => reply(cwd_year),
					"CWD" => reply("250 ok"),
					"MKD" => reply(mkd),
					"TYPE" => reply("200 type set"),
					"PASV" => {
						let l = TcpListener::bind(("127.0.0.1", 0)).unwrap();
						let port = l.local_addr().unwrap().port();
						reply(&format!("227 Entering Passive Mode (127,0,0,1,{},{})", port >> 8, port & 0xff));
						passive = Some(l);
					},
					"STOR" => {
						reply("150 ok to send data");
						let (mut data, _) = passive.take().unwrap().accept().unwrap();
						data.read_to_end(&mut stored).unwrap();
						reply("226 transfer complete");
					},
					"QUIT" => {
						reply("221 bye");
						break;
					},
					_ => reply("502 not implemented"),
				}
			}
			(commands, stored)
		})
	}

	fn local_server() -> (TcpListener, u16) {
		let l = TcpListener::bind(("127.0.0.1", 0)).unwrap();
		let port = l.local_addr().unwrap().port();
		(l, port)
	}

	fn target(port: u16) -> Target {
		Target{
			host: "127.0.0.1".into(),
			port,
			user: "pi".into(),
			password: "secret".into(),
			path: "USB_STICK/METER_SERVER_BACKUP".into(),
			timeout: Duration::from_secs(2),
		}
	}

	fn sample() -> Upload {
		Upload::new(
			NaiveDate::from_ymd_opt(2022, 1, 17).unwrap(),
			Arc::from("time;p\n"),
		)
	}

	#[test]
	fn test_upload_reports_refused_connection() {
		// grab a free port and release it again so nothing listens there
		let port = {
			let l = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
			l.local_addr().unwrap().port()
		};
		match upload(&target(port), &sample()) {
			Err(Error::Connect(_)) => (),
			other => panic!("unexpected result: {:?}", other),
		}
	}

	#[test]
	fn test_upload_into_existing_year_directory() {
		let (listener, port) = local_server();
		let server = serve(listener, "550 directory exists", "250 ok");
		upload(&target(port), &sample()).unwrap();
		let (commands, stored) = server.join().unwrap();
		assert_eq!(commands, vec![
			"USER pi",
			"PASS secret",
			"CWD USB_STICK/METER_SERVER_BACKUP",
			"MKD 2022",
			"CWD 2022",
			"TYPE I",
			"PASV",
			"STOR 2022-01-17.csv",
			"QUIT",
		]);
		assert_eq!(stored, b"time;p\n");
	}

	#[test]
	fn test_upload_creates_year_directory() {
		let (listener, port) = local_server();
		let server = serve(listener, "257 \"2022\" created", "250 ok");
		let mut t = target(port);
		t.path = String::new();
		upload(&t, &sample()).unwrap();
		let (commands, stored) = server.join().unwrap();
		assert_eq!(commands[2], "MKD 2022");
		assert_eq!(commands[3], "CWD 2022");
		assert_eq!(stored, b"time;p\n");
	}

	#[test]
	fn test_upload_fails_if_year_directory_is_unusable() {
		let (listener, port) = local_server();
		let server = serve(listener, "550 permission denied", "550 no such directory");
		match upload(&target(port), &sample()) {
			Err(Error::Directory{path, ..}) => assert_eq!(path, "2022"),
			other => panic!("unexpected result: {:?}", other),
		}
		let (commands, stored) = server.join().unwrap();
		assert!(!commands.iter().any(|c| c.starts_with("STOR")));
		assert!(stored.is_empty());
	}

	#[test]
	fn test_upload_gives_up_on_silent_server() {
		let (listener, port) = local_server();
		let (release, held) = mpsc::channel::<()>();
		let server = thread::spawn(move || {
			// accept, never greet, keep the connection open until released
			let (_conn, _) = listener.accept().unwrap();
			let _ = held.recv();
		});

		let (done, result) = mpsc::channel();
		let mut t = target(port);
		t.timeout = Duration::from_secs(1);
		thread::spawn(move || {
			let _ = done.send(upload(&t, &sample()));
		});
		match result.recv_timeout(Duration::from_secs(10)) {
			Ok(Err(Error::Connect(_))) => (),
			other => panic!("unexpected result: {:?}", other),
		}
		drop(release);
		server.join().unwrap();
	}

	#[test]
	fn test_upload_reports_unresolvable_host() {
		let mut t = target(21);
		t.host = "host.invalid".into();
		assert!(matches!(upload(&t, &sample()), Err(Error::Resolve(_))));
	}

	#[test]
	fn test_debug_hides_password() {
		let rendered = format!("{:?}", target(21));
		assert!(rendered.contains("127.0.0.1"));
		assert!(!rendered.contains("secret"));
	}
}
