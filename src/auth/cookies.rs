use std::collections::HashMap;
use std::sync::Mutex;

use actix_web::cookie::Cookie;
use actix_web::{HttpRequest, HttpResponseBuilder};

/// Cookie transport consumed by the CSRF guard and session store.
///
/// A value added through the jar is immediately visible to `get` within the
/// same request, matching the browser behaviour of a Set-Cookie issued and
/// read on the same page load.
pub trait CookieJar {
    fn get(&self, name: &str) -> Option<String>;
    fn add(&self, cookie: Cookie<'static>);
    fn remove(&self, name: &str);
}

/// Request-scoped jar over an actix [`HttpRequest`]. Mutations are buffered
/// and flushed onto the response as Set-Cookie headers.
pub struct RequestCookies {
    req: HttpRequest,
    pending: Mutex<Vec<Cookie<'static>>>,
}

impl RequestCookies {
    pub fn new(req: &HttpRequest) -> Self {
        Self {
            req: req.clone(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Apply all buffered cookie mutations to a response.
    pub fn flush_into(&self, builder: &mut HttpResponseBuilder) {
        let mut pending = self.pending.lock().expect("cookie jar lock");
        for cookie in pending.drain(..) {
            builder.cookie(cookie);
        }
    }
}

impl CookieJar for RequestCookies {
    fn get(&self, name: &str) -> Option<String> {
        let pending = self.pending.lock().expect("cookie jar lock");
        // The latest buffered mutation wins over what the request carried.
        if let Some(cookie) = pending.iter().rev().find(|c| c.name() == name) {
            if cookie.value().is_empty() {
                return None;
            }
            return Some(cookie.value().to_string());
        }
        drop(pending);
        self.req.cookie(name).map(|c| c.value().to_string())
    }

    fn add(&self, cookie: Cookie<'static>) {
        self.pending.lock().expect("cookie jar lock").push(cookie);
    }

    fn remove(&self, name: &str) {
        let mut removal = Cookie::new(name.to_owned(), "");
        removal.set_path("/");
        removal.make_removal();
        self.pending.lock().expect("cookie jar lock").push(removal);
    }
}

/// In-memory jar for tests: a plain name/value map with no attributes.
#[derive(Default)]
pub struct MemoryJar {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for MemoryJar {
    fn get(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .expect("cookie jar lock")
            .get(name)
            .cloned()
    }

    fn add(&self, cookie: Cookie<'static>) {
        self.values
            .lock()
            .expect("cookie jar lock")
            .insert(cookie.name().to_string(), cookie.value().to_string());
    }

    fn remove(&self, name: &str) {
        self.values.lock().expect("cookie jar lock").remove(name);
    }
}
