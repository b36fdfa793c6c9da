//! In-process fake of a Home Access portal for integration tests.
//!
//! Issues a rotating anti-forgery token on the login page, an auth cookie on
//! successful login, and a fresh `__VIEWSTATE` on every report card render.
//! A postback carrying anything but the latest view state gets a 500.

#![allow(dead_code)]

use axum::extract::State;
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use gradebook::gpa::ScaleRegistry;
use gradebook::portal::{Credentials, PortalClient, PortalConfig};

pub const USERNAME: &str = "student";
pub const PASSWORD: &str = "hunter2";

const LOGIN_PATH: &str = "/HomeAccess/Account/LogOn";
const ASSIGNMENTS: &str = include_str!("../fixtures/assignments.html");
const CLASSES: &str = include_str!("../fixtures/classes.html");

/// Cycle values offered by the report card selector, in page order.
pub const CYCLES: [&str; 3] = ["1-2026", "2-2026", "3-2026"];
/// Cycle rendered by a plain GET of the report card page.
const CURRENT_CYCLE: &str = "2-2026";

#[derive(Default)]
pub struct FakePortal {
    counter: AtomicUsize,
    /// ASP.NET session cookie → anti-forgery token it was last served
    login_tokens: Mutex<HashMap<String, String>>,
    /// Auth cookies the portal still honours
    auth: Mutex<HashSet<String>>,
    /// Auth cookie → latest report card view state
    view_states: Mutex<HashMap<String, String>>,
    pub login_posts: AtomicUsize,
    pub report_card_posts: AtomicUsize,
    pub stale_postbacks: AtomicUsize,
    pub logoffs: AtomicUsize,
}

impl FakePortal {
    fn next(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Logs every session out server-side.
    pub fn expire_all(&self) {
        self.auth.lock().unwrap().clear();
    }

    pub fn active_logins(&self) -> usize {
        self.auth.lock().unwrap().len()
    }
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn serve(app: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Url::parse(&format!("http://{address}")).unwrap()
}

/// Starts a fake portal.
pub async fn start_portal() -> (Url, Arc<FakePortal>) {
    let portal = Arc::new(FakePortal::default());
    let app = Router::new()
        .route(LOGIN_PATH, get(login_page).post(login_submit))
        .route("/HomeAccess/", get(home))
        .route("/HomeAccess/Home/WeekView", get(week_view))
        .route("/HomeAccess/Content/Student/Assignments.aspx", get(assignments))
        .route("/HomeAccess/Content/Student/Classes.aspx", get(classes))
        .route(
            "/HomeAccess/Content/Student/ReportCards.aspx",
            get(report_card).post(report_card_postback),
        )
        .route("/HomeAccess/Account/LogOff", get(log_off))
        .with_state(portal.clone());
    (serve(app).await, portal)
}

/// Portal configuration pointed at `base`, with fast retries.
pub fn portal_config(base: &Url) -> PortalConfig {
    PortalConfig {
        base_url: Some(base.to_string()),
        backoff_base_ms: 5,
        request_timeout_ms: 5_000,
        ..PortalConfig::default()
    }
}

pub fn client_for(base: &Url) -> PortalClient {
    PortalClient::new(portal_config(base), ScaleRegistry::new()).unwrap()
}

pub fn credentials(username: &str, password: &str) -> Credentials {
    Credentials {
        username: username.to_string(),
        password: password.to_string(),
        portal_base_url: None,
    }
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.to_string())
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

fn to_login() -> Response {
    redirect("/HomeAccess/Account/LogOn?ReturnUrl=%2fHomeAccess%2f")
}

/// Auth cookie of a logged-in caller.
fn authed(portal: &FakePortal, headers: &HeaderMap) -> Option<String> {
    cookie(headers, ".AuthCookie").filter(|c| portal.auth.lock().unwrap().contains(c))
}

fn login_html(token: &str, error: Option<&str>) -> String {
    let error = error
        .map(|e| format!(r#"<div class="validation-summary-errors"><ul><li>{e}</li></ul></div>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body>
        {error}
        <form action="/HomeAccess/Account/LogOn?ReturnUrl=%2fHomeAccess%2f" method="post">
          <input name="__RequestVerificationToken" type="hidden" value="{token}" />
          <input type="hidden" name="SCKTY00328510CustomEnabled" value="False" />
          <input type="text" name="LogOnDetails.UserName" />
          <input type="password" name="LogOnDetails.Password" />
          <button type="submit">Log In</button>
        </form></body></html>"#
    )
}

async fn login_page(State(portal): State<Arc<FakePortal>>, headers: HeaderMap) -> Response {
    let n = portal.next();
    let asp = cookie(&headers, "ASP.NET_SessionId").unwrap_or_else(|| format!("asp{n}"));
    let token = format!("tok{n}");
    portal
        .login_tokens
        .lock()
        .unwrap()
        .insert(asp.clone(), token.clone());

    (
        [(SET_COOKIE, format!("ASP.NET_SessionId={asp}; path=/; HttpOnly"))],
        Html(login_html(&token, None)),
    )
        .into_response()
}

async fn login_submit(
    State(portal): State<Arc<FakePortal>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    portal.login_posts.fetch_add(1, Ordering::SeqCst);

    let field = |name: &str| form.get(name).map(String::as_str).unwrap_or_default();
    let token_ok = cookie(&headers, "ASP.NET_SessionId")
        .and_then(|asp| portal.login_tokens.lock().unwrap().remove(&asp))
        .is_some_and(|expected| expected == field("__RequestVerificationToken"));
    let credentials_ok = field("LogOnDetails.UserName") == USERNAME
        && field("LogOnDetails.Password") == PASSWORD
        && field("Database") == "10"
        && field("VerificationOption") == "UsernamePassword";

    if !token_ok {
        return (StatusCode::BAD_REQUEST, "anti-forgery token mismatch").into_response();
    }
    if !credentials_ok {
        let n = portal.next();
        return Html(login_html(
            &format!("tok{n}"),
            Some("Your attempt to log on was unsuccessful."),
        ))
        .into_response();
    }

    let auth = format!("auth{}", portal.next());
    portal.auth.lock().unwrap().insert(auth.clone());
    (
        StatusCode::FOUND,
        [
            (LOCATION, "/HomeAccess/".to_string()),
            (SET_COOKIE, format!(".AuthCookie={auth}; path=/; HttpOnly")),
        ],
    )
        .into_response()
}

async fn home(State(portal): State<Arc<FakePortal>>, headers: HeaderMap) -> Response {
    match authed(&portal, &headers) {
        Some(_) => redirect("/HomeAccess/Home/WeekView"),
        None => to_login(),
    }
}

async fn week_view(State(portal): State<Arc<FakePortal>>, headers: HeaderMap) -> Response {
    match authed(&portal, &headers) {
        Some(_) => Html(
            r#"<html><body><div class="sg-banner">Week View</div>
            <a href="/HomeAccess/Account/LogOff">Logoff</a></body></html>"#,
        )
        .into_response(),
        None => to_login(),
    }
}

async fn assignments(State(portal): State<Arc<FakePortal>>, headers: HeaderMap) -> Response {
    match authed(&portal, &headers) {
        Some(_) => Html(ASSIGNMENTS).into_response(),
        None => to_login(),
    }
}

async fn classes(State(portal): State<Arc<FakePortal>>, headers: HeaderMap) -> Response {
    match authed(&portal, &headers) {
        Some(_) => Html(CLASSES).into_response(),
        None => to_login(),
    }
}

/// Calculus and English grades per cycle; cycle 3 is not graded yet.
fn cycle_grades(cycle: &str) -> (&'static str, &'static str) {
    match cycle {
        "1-2026" => ("97", "85"),
        "2-2026" => ("98", "90"),
        _ => ("", ""),
    }
}

fn report_card_html(portal: &FakePortal, auth: &str, selected: &str) -> String {
    let view_state = format!("vs{}", portal.next());
    portal
        .view_states
        .lock()
        .unwrap()
        .insert(auth.to_string(), view_state.clone());

    let options: String = CYCLES
        .iter()
        .enumerate()
        .map(|(i, value)| {
            let sel = if *value == selected { r#" selected="selected""# } else { "" };
            format!(r#"<option{sel} value="{value}">{}</option>"#, i + 1)
        })
        .collect();

    // Every cycle's column carries that cycle's grade only when it is the
    // rendered one, so a wrong postback shows up as wrong data
    let column = |cycle: &str, grade: &'static str| if cycle == selected { grade } else { "" };
    let (calc, eng) = cycle_grades(selected);
    let cells = |grade: &'static str| {
        CYCLES
            .iter()
            .map(|c| format!("<td>{}</td>", column(*c, grade)))
            .collect::<String>()
    };

    format!(
        r#"<html><body>
        <a href="/HomeAccess/Account/LogOff">Logoff</a>
        <form method="post" action="./ReportCards.aspx" id="aspnetForm">
          <input type="hidden" name="__EVENTTARGET" id="__EVENTTARGET" value="" />
          <input type="hidden" name="__EVENTARGUMENT" id="__EVENTARGUMENT" value="" />
          <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="{view_state}" />
          <input type="hidden" name="__VIEWSTATEGENERATOR" id="__VIEWSTATEGENERATOR" value="B0C1D2E3" />
          <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="ev-{view_state}" />
          <select name="ctl00$plnMain$ddlRCRuns" id="plnMain_ddlRCRuns">{options}</select>
          <table class="sg-asp-table" id="plnMain_dgReportCard">
            <tr class="sg-asp-table-header-row">
              <td>Course</td><td>Description</td><td>Period</td><td>Teacher</td><td>Room</td>
              <td>Att. Credit</td><td>Ern. Credit</td><td>1st</td><td>2nd</td><td>3rd</td>
            </tr>
            <tr class="sg-asp-table-data-row">
              <td>2073C - 1</td><td>AP Calculus AB</td><td>1</td><td>Nguyen, Linh</td><td>B214</td>
              <td>0.50</td><td></td>{}
            </tr>
            <tr class="sg-asp-table-data-row">
              <td>1121A - 3</td><td>English II</td><td>3</td><td>Patel, Riya</td><td>C108</td>
              <td>0.50</td><td></td>{}
            </tr>
          </table>
        </form></body></html>"#,
        cells(calc),
        cells(eng),
    )
}

async fn report_card(State(portal): State<Arc<FakePortal>>, headers: HeaderMap) -> Response {
    match authed(&portal, &headers) {
        Some(auth) => Html(report_card_html(&portal, &auth, CURRENT_CYCLE)).into_response(),
        None => to_login(),
    }
}

async fn report_card_postback(
    State(portal): State<Arc<FakePortal>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let Some(auth) = authed(&portal, &headers) else {
        return to_login();
    };
    portal.report_card_posts.fetch_add(1, Ordering::SeqCst);

    let current = portal.view_states.lock().unwrap().get(&auth).cloned();
    let sent = form.get("__VIEWSTATE").cloned();
    if current.is_none() || current != sent {
        portal.stale_postbacks.fetch_add(1, Ordering::SeqCst);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html("<h1>Server Error in '/HomeAccess' Application.</h1><p>Invalid viewstate.</p>"),
        )
            .into_response();
    }

    let target = form.get("__EVENTTARGET").cloned().unwrap_or_default();
    let Some(cycle) = form.get(&target).filter(|c| CYCLES.contains(&c.as_str())) else {
        return (StatusCode::BAD_REQUEST, "unknown cycle").into_response();
    };
    Html(report_card_html(&portal, &auth, cycle)).into_response()
}

async fn log_off(State(portal): State<Arc<FakePortal>>, headers: HeaderMap) -> Response {
    portal.logoffs.fetch_add(1, Ordering::SeqCst);
    if let Some(auth) = cookie(&headers, ".AuthCookie") {
        portal.auth.lock().unwrap().remove(&auth);
    }
    (
        StatusCode::FOUND,
        [
            (LOCATION, "/HomeAccess/Account/LogOn".to_string()),
            (
                SET_COOKIE,
                ".AuthCookie=; expires=Thu, 01 Jan 1970 00:00:00 GMT; path=/".to_string(),
            ),
        ],
    )
        .into_response()
}
