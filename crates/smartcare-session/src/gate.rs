//! Access Gate - pure navigation decisions from session state.
//!
//! The gate keeps no state of its own; callers re-evaluate it on every
//! session notification.

use serde::{Deserialize, Serialize};
use smartcare_types::{SessionState, SessionStatus};
use std::fmt;

/// Which side of the gate a view lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    /// Only for signed-out users (login, signup).
    Public,
    /// Only for signed-in users.
    Protected,
}

/// Outcome of the gate for one view kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Session not settled; show a neutral placeholder.
    Pending,
    Allow,
    Deny,
}

/// Gate predicate over the session status.
pub fn evaluate(status: SessionStatus, view: ViewKind) -> Access {
    match (status, view) {
        (SessionStatus::Loading, _) => Access::Pending,
        (SessionStatus::Unauthenticated, ViewKind::Public) => Access::Allow,
        (SessionStatus::Unauthenticated, ViewKind::Protected) => Access::Deny,
        (SessionStatus::AuthenticatedNoProfile | SessionStatus::Authenticated, ViewKind::Public) => {
            Access::Deny
        }
        (
            SessionStatus::AuthenticatedNoProfile | SessionStatus::Authenticated,
            ViewKind::Protected,
        ) => Access::Allow,
    }
}

/// Dashboard routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Login,
    Signup,
    Dashboard,
    Patients,
    Appointments,
    Prescriptions,
    HealthRecords,
}

impl Route {
    pub const ALL: [Route; 7] = [
        Route::Login,
        Route::Signup,
        Route::Dashboard,
        Route::Patients,
        Route::Appointments,
        Route::Prescriptions,
        Route::HealthRecords,
    ];

    /// Map a path to a route. Unknown paths fall back to the dashboard.
    pub fn parse(path: &str) -> Route {
        let trimmed = path.trim().trim_end_matches('/');
        Self::ALL
            .into_iter()
            .find(|route| route.path().trim_end_matches('/') == trimmed)
            .unwrap_or(Route::Dashboard)
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::Dashboard => "/",
            Route::Patients => "/patients",
            Route::Appointments => "/appointments",
            Route::Prescriptions => "/prescriptions",
            Route::HealthRecords => "/health-records",
        }
    }

    pub fn kind(&self) -> ViewKind {
        match self {
            Route::Login | Route::Signup => ViewKind::Public,
            _ => ViewKind::Protected,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// What the renderer should do for a requested route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateDecision {
    Placeholder,
    Render(Route),
    Redirect(Route),
}

/// Decide how to handle `route` for the given session.
///
/// Denied protected routes send the user to the login page; denied public
/// routes send a signed-in user to the dashboard.
pub fn decide(state: &SessionState, route: Route) -> GateDecision {
    match evaluate(state.status(), route.kind()) {
        Access::Pending => GateDecision::Placeholder,
        Access::Allow => GateDecision::Render(route),
        Access::Deny => match route.kind() {
            ViewKind::Protected => GateDecision::Redirect(Route::Login),
            ViewKind::Public => GateDecision::Redirect(Route::Dashboard),
        },
    }
}
