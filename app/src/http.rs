use std::collections::{HashMap, VecDeque};
use std::error::Error;
use std::io::Read;
use std::net::ToSocketAddrs;
use std::sync::{Mutex, MutexGuard};

use json::object;
use log::{error, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tiny_http::{Header, Method, Request, Response};

use crate::monitor::StatusProbe;
use crate::relay::{Relay, RelayOutput};
use crate::sensor::SensorReader;
use crate::DoorState;

const HOME_HTML: &str = include_str!("home.html");
const LOGIN_HTML: &str = include_str!("login.html");
const SESSION_COOKIE: &str = "session";
const TOKEN_LEN: usize = 32;
const MAX_SESSIONS: usize = 64;

const HTML: &str = "text/html; charset=utf-8";
const JSON: &str = "application/json; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

/// Response produced by [`Controller::handle`], independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    pub set_cookie: Option<String>,
}

impl Reply {
    fn new(status: u16, content_type: &'static str, body: String) -> Self {
        Reply {
            status,
            content_type,
            body,
            set_cookie: None,
        }
    }

    fn with_cookie(mut self, cookie: String) -> Self {
        self.set_cookie = Some(cookie);
        self
    }

    fn into_response(self) -> Response<std::io::Cursor<Vec<u8>>> {
        let mut response = Response::from_string(self.body).with_status_code(self.status);
        if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], self.content_type.as_bytes()) {
            response.add_header(header);
        }
        if let Some(cookie) = self.set_cookie {
            if let Ok(header) = Header::from_bytes(&b"Set-Cookie"[..], cookie.as_bytes()) {
                response.add_header(header);
            }
        }
        response
    }
}

/// Username to password map. Checked as an opaque pair, nothing more.
pub struct Credentials(HashMap<String, String>);

impl Credentials {
    pub fn new(users: HashMap<String, String>) -> Self {
        Credentials(users)
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        self.0.get(username).map_or(false, |expected| expected == password)
    }
}

/// In-memory login sessions keyed by a random token, oldest first.
/// Holds at most `MAX_SESSIONS`; a new login past that forgets the oldest.
#[derive(Default)]
struct Sessions(Mutex<VecDeque<String>>);

impl Sessions {
    fn tokens(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn create(&self) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();
        let mut tokens = self.tokens();
        if tokens.len() >= MAX_SESSIONS {
            tokens.pop_front();
        }
        tokens.push_back(token.clone());
        token
    }

    fn contains(&self, token: &str) -> bool {
        self.tokens().iter().any(|known| known == token)
    }

    fn remove(&self, token: &str) {
        self.tokens().retain(|known| known != token);
    }
}

fn session_token(cookie_header: Option<&str>) -> Option<&str> {
    cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|token| !token.is_empty())
}

/// The door's web controls: login, status and the trigger button.
pub struct Controller<S, O: RelayOutput> {
    probe: StatusProbe<S>,
    relay: Mutex<Relay<O>>,
    credentials: Credentials,
    sessions: Sessions,
}

impl<S: SensorReader, O: RelayOutput> Controller<S, O> {
    pub fn new(probe: StatusProbe<S>, relay: Relay<O>, credentials: Credentials) -> Self {
        Controller {
            probe,
            relay: Mutex::new(relay),
            credentials,
            sessions: Sessions::default(),
        }
    }

    fn relay(&self) -> MutexGuard<'_, Relay<O>> {
        // Poisoned only if a pulse panicked; the relay itself is still usable.
        self.relay.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drive the relay to its inactive level, used on shutdown.
    pub fn release_relay(&self) {
        self.relay().release();
    }

    pub fn handle(&self, method: &Method, url: &str, cookie: Option<&str>, body: &str) -> Reply {
        let path = url.split('?').next().unwrap_or(url);
        let session = session_token(cookie).filter(|token| self.sessions.contains(token));
        match (method, path) {
            (Method::Get, "/") => match session {
                Some(_) => self.home(),
                None => Reply::new(200, HTML, LOGIN_HTML.to_string()),
            },
            (Method::Post, "/login") => self.login(body),
            (Method::Get, "/logout") => {
                if let Some(token) = session {
                    self.sessions.remove(token);
                }
                Reply::new(200, HTML, "<p>Logged out successfully.</p>".to_string())
                    .with_cookie(format!("{}=; Path=/; Max-Age=0", SESSION_COOKIE))
            }
            (Method::Post, "/trigger") if session.is_some() => self.trigger(),
            (Method::Get, "/door.json") if session.is_some() => {
                let obj = object! { state: self.probe.current_state().to_string() };
                Reply::new(200, JSON, json::stringify_pretty(obj, 2))
            }
            (Method::Post, "/trigger") | (Method::Get, "/door.json") => {
                Reply::new(401, JSON, json::stringify(object! { detail: "Unauthorized" }))
            }
            _ => Reply::new(404, TEXT, "Not found".to_string()),
        }
    }

    fn home(&self) -> Reply {
        let status = match self.probe.current_state() {
            DoorState::Open => "🔴 Open",
            DoorState::Closed => "🟢 Closed",
            DoorState::Unknown => "🔵 Unknown",
        };
        Reply::new(200, HTML, HOME_HTML.replace("$doorstate$", status))
    }

    fn login(&self, body: &str) -> Reply {
        let form = match json::parse(body) {
            Ok(form) => form,
            Err(_) => return Reply::new(400, TEXT, "Expected a JSON body".to_string()),
        };
        let (username, password) = match (form["username"].as_str(), form["password"].as_str()) {
            (Some(username), Some(password)) => (username, password),
            _ => return Reply::new(400, TEXT, "Expected username and password".to_string()),
        };
        if !self.credentials.verify(username, password) {
            warn!("failed login for {}", username);
            return Reply::new(401, TEXT, "Invalid credentials".to_string());
        }
        info!("{} logged in", username);
        let token = self.sessions.create();
        self.home().with_cookie(format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict",
            SESSION_COOKIE, token
        ))
    }

    fn trigger(&self) -> Reply {
        match self.relay().trigger() {
            Ok(()) => Reply::new(200, JSON, json::stringify(object! { status: "Relay triggered" })),
            Err(err) => {
                error!("{}", err);
                let obj = object! { status: "Relay failed", detail: err.to_string() };
                Reply::new(500, JSON, json::stringify(obj))
            }
        }
    }
}

pub struct Server(tiny_http::Server);

impl Server {
    pub fn new<A>(addr: A) -> Result<Server, Box<dyn Error + Send + Sync + 'static>>
    where
        A: ToSocketAddrs,
    {
        tiny_http::Server::http(addr).map(Server)
    }

    /// Serve requests one at a time until [`Server::shutdown`] is called.
    /// Handling them sequentially also serialises relay pulses.
    pub fn handle_requests<S, O>(&self, controller: &Controller<S, O>)
    where
        S: SensorReader,
        O: RelayOutput,
    {
        for mut request in self.0.incoming_requests() {
            let reply = match read_body(&mut request) {
                Ok(body) => {
                    let cookie = request
                        .headers()
                        .iter()
                        .find(|header| header.field.equiv("Cookie"))
                        .map(|header| header.value.as_str().to_string());
                    controller.handle(request.method(), request.url(), cookie.as_deref(), &body)
                }
                Err(err) => Reply::new(400, TEXT, format!("Unreadable request: {}", err)),
            };

            // Ignoring I/O errors that occur here so that we don't take down the process if there
            // is an issue sending the response.
            let _ = request.respond(reply.into_response());
        }
    }

    pub fn shutdown(&self) {
        self.0.unblock();
    }
}

fn read_body(request: &mut Request) -> std::io::Result<String> {
    let mut body = String::new();
    request.as_reader().read_to_string(&mut body)?;
    Ok(body)
}
