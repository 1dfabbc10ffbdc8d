//! Route guards and post-login redirects.
//!
//! Every decision about where a user belongs goes through [`home_route`] and
//! [`guard`], which in turn rely on the single role derivation in
//! [`Role::for_student_id`](crate::types::Role::for_student_id).

use std::fmt;

use crate::session::Session;
use crate::types::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    Chat,
    Admin,
}

impl Route {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Register => "/register",
            Self::Chat => "/chat",
            Self::Admin => "/admin",
        }
    }

    /// Resolves a path. `/` is the login page; unknown paths resolve to `None`.
    #[must_use]
    pub fn parse(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "" | "/login" => Some(Self::Login),
            "/register" => Some(Self::Register),
            "/chat" => Some(Self::Chat),
            "/admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Pages only shown to signed-out visitors.
    #[must_use]
    pub fn is_public_only(self) -> bool {
        matches!(self, Self::Login | Self::Register)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// What to do when a route is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// The session is still being confirmed.
    Loading,
    Render,
    Redirect(Route),
}

/// Where a signed-in user lands by default.
#[must_use]
pub fn home_route(user: &User) -> Route {
    if user.is_admin() {
        Route::Admin
    } else {
        Route::Chat
    }
}

pub fn guard(route: Route, session: &Session) -> RouteDecision {
    if session.is_loading() {
        return RouteDecision::Loading;
    }
    match (route, session.user().filter(|_| session.is_authenticated())) {
        (r, Some(user)) if r.is_public_only() => RouteDecision::Redirect(home_route(user)),
        (Route::Admin, Some(user)) if !user.is_admin() => RouteDecision::Redirect(Route::Chat),
        (_, Some(_)) => RouteDecision::Render,
        (r, None) if r.is_public_only() => RouteDecision::Render,
        (_, None) => RouteDecision::Redirect(Route::Login),
    }
}

/// Target after a successful sign-in: the page the user was sent away from,
/// if they may see it, otherwise their home route.
#[must_use]
pub fn post_login_target(user: &User, requested: Option<Route>) -> Route {
    match requested {
        Some(Route::Admin) if user.is_admin() => Route::Admin,
        Some(Route::Chat) => Route::Chat,
        _ => home_route(user),
    }
}
