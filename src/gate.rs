//! Route guards between the login view and the home view.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Register,
}

impl Route {
    /// Parse a route path. Empty and unknown paths fall back to home.
    pub fn parse(path: &str) -> Self {
        match path.trim().trim_matches('/').to_lowercase().as_str() {
            "register" | "login" => Route::Register,
            _ => Route::Home,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Home => "/home",
            Route::Register => "/register",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Allow,
    Redirect(Route),
}

/// Home requires a signed-in student
pub fn guard_home(session_present: bool) -> Outcome {
    if session_present {
        Outcome::Allow
    } else {
        Outcome::Redirect(Route::Register)
    }
}

/// Registration is only for students who are not signed in
pub fn guard_register(session_present: bool) -> Outcome {
    if session_present {
        Outcome::Redirect(Route::Home)
    } else {
        Outcome::Allow
    }
}

/// The view actually shown when entering `route`
pub fn resolve(route: Route, session_present: bool) -> Route {
    let outcome = match route {
        Route::Home => guard_home(session_present),
        Route::Register => guard_register(session_present),
    };
    match outcome {
        Outcome::Allow => route,
        Outcome::Redirect(target) => target,
    }
}
