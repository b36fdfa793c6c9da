//! Public facade over the portal.
//!
//! Each operation resolves its session, runs its page sequence under that
//! session's lock, and writes the session back:
//! 1. GET the page (or the latest postback form)
//! 2. Detect a bounce to the login page (server-side logout)
//! 3. Parse the page into entities
//! 4. Score the entities with the default GPA scale

use super::config::PortalConfig;
use super::cookies::CookieJar;
use super::error::PortalError;
use super::form::{extract_form, looks_like_login_page, REQUEST_VERIFICATION_TOKEN};
use super::grades::{apply_class_info, parse_classes_page, parse_course_assignments, parse_grades_page};
use super::report_card::{build_cycle_postback, parse_cycle_courses, parse_cycle_selector};
use super::session::{
    user_fingerprint, MemorySessionStore, Session, SessionId, SessionManager, SessionStore,
};
use super::transport::{PortalRequest, PortalTransport};
use super::types::{
    Assignment, Course, Credentials, GradesResponse, PortalPage, ReportCard, ReportCardCycle,
};
use crate::gpa::{
    self, apply_course_gpas, apply_report_card_gpas, cycle_gpas, round_to, summarize,
    CourseFilter, CourseInput, GpaRequest, GpaScale, GpaSummary, ScaleRegistry,
};
use rand::Rng;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// Client for one portal family, shared by every session.
pub struct PortalClient {
    transport: PortalTransport,
    sessions: SessionManager,
    config: PortalConfig,
    scales: ScaleRegistry,
    /// Scale used for the `gpa` fields of fetched entities
    default_scale: GpaScale,
    logged_in_marker: Selector,
    login_error: Selector,
}

impl PortalClient {
    /// Creates a client backed by the in-process session store.
    pub fn new(config: PortalConfig, scales: ScaleRegistry) -> Result<Self, PortalError> {
        Self::with_store(config, scales, Arc::new(MemorySessionStore::new()))
    }

    /// Creates a client backed by the given session store.
    pub fn with_store(
        config: PortalConfig,
        scales: ScaleRegistry,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, PortalError> {
        let transport = PortalTransport::new(&config)?;
        let default_scale = scales
            .get(&config.default_scale)
            .cloned()
            .ok_or_else(|| {
                PortalError::invalid_input(format!(
                    "default scale '{}' is not registered",
                    config.default_scale
                ))
            })?;
        let logged_in_marker = parse_selector(&config.logged_in_marker)?;
        let login_error = parse_selector(&config.login.error_selector)?;

        Ok(Self {
            transport,
            sessions: SessionManager::new(store, config.session_ttl()),
            config,
            scales,
            default_scale,
            logged_in_marker,
            login_error,
        })
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn scales(&self) -> &ScaleRegistry {
        &self.scales
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    /// Logs in and stores a new session.
    ///
    /// No session is created unless the portal accepts the credentials.
    pub async fn login(&self, credentials: Credentials) -> Result<Session, PortalError> {
        let correlation_id = generate_correlation_id();
        let user = user_fingerprint(&credentials.username);

        if credentials.username.trim().is_empty() || credentials.password.is_empty() {
            return Err(PortalError::invalid_input("username and password are required"));
        }

        let purged = self.sessions.purge_expired();
        if purged > 0 {
            debug!(correlation_id = %correlation_id, purged = purged, "Purged stale sessions");
        }

        let base_url = self
            .config
            .resolve_base_url(credentials.portal_base_url.as_deref())
            .map_err(PortalError::invalid_input)?;

        info!(
            correlation_id = %correlation_id,
            user_fingerprint = %user,
            portal = %base_url,
            "Starting portal login"
        );

        let start = Instant::now();
        let mut jar = CookieJar::new();
        let result = self
            .execute_login(&mut jar, &base_url, &credentials, &correlation_id)
            .await;

        match result {
            Ok(()) => {
                let session = self.sessions.create(base_url, credentials, jar);
                info!(
                    correlation_id = %correlation_id,
                    user_fingerprint = %user,
                    session = %session.id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Portal login succeeded"
                );
                Ok(session)
            }
            Err(e) => {
                warn!(
                    correlation_id = %correlation_id,
                    user_fingerprint = %user,
                    error = %e,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Portal login failed"
                );
                Err(e)
            }
        }
    }

    /// Login page → hidden fields → credential POST → outcome check.
    async fn execute_login(
        &self,
        jar: &mut CookieJar,
        base_url: &Url,
        credentials: &Credentials,
        correlation_id: &str,
    ) -> Result<(), PortalError> {
        let login_url = self.config.page_url(base_url, &self.config.paths.login)?;
        let page = self
            .transport
            .execute(jar, PortalRequest::get(login_url), correlation_id)
            .await?;

        let mut form = extract_form(&page.body, &page.url, &[REQUEST_VERIFICATION_TOKEN])?;
        form.set(self.config.login.username_field.as_str(), credentials.username.as_str());
        form.set(self.config.login.password_field.as_str(), credentials.password.as_str());
        for (name, value) in &self.config.login.static_fields {
            form.set(name.as_str(), value.as_str());
        }

        let action = form.action.clone();
        debug!(
            correlation_id = %correlation_id,
            action = %action,
            fields = form.len(),
            "Posting login form"
        );

        let response = self
            .transport
            .execute(jar, PortalRequest::post_form(action, form.into_pairs()), correlation_id)
            .await;

        let page = match response {
            Ok(page) => page,
            Err(PortalError::PortalRejected { status, .. }) if (400..500).contains(&status) => {
                return Err(PortalError::AuthenticationFailed {
                    message: format!("portal refused the login with status {status}"),
                });
            }
            Err(e) => return Err(e),
        };

        let document = Html::parse_document(&page.body);
        if let Some(message) = document
            .select(&self.login_error)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
        {
            let message = message.split_whitespace().collect::<Vec<_>>().join(" ");
            return Err(PortalError::AuthenticationFailed {
                message: if message.is_empty() {
                    "invalid username or password".to_string()
                } else {
                    message
                },
            });
        }
        if looks_like_login_page(&page.body) {
            return Err(PortalError::AuthenticationFailed {
                message: "portal returned to the login page".to_string(),
            });
        }

        Ok(())
    }

    /// Returns true only if the portal still treats the session as logged in.
    ///
    /// Never fails: unknown, expired, and unreachable all read as false.
    pub async fn validate_session(&self, id: &SessionId) -> bool {
        let correlation_id = generate_correlation_id();

        let mut lease = match self.sessions.checkout(id).await {
            Ok(lease) => lease,
            Err(e) => {
                debug!(correlation_id = %correlation_id, session = %id, error = %e, "Session not usable");
                return false;
            }
        };

        let result = self.check_logged_in(&mut lease.session, &correlation_id).await;
        let valid = result.is_ok();
        if let Err(e) = &result {
            info!(correlation_id = %correlation_id, session = %id, error = %e, "Session failed validation");
        }
        self.sessions.checkin(lease, result.as_ref().map(|_| ()));
        valid
    }

    async fn check_logged_in(
        &self,
        session: &mut Session,
        correlation_id: &str,
    ) -> Result<(), PortalError> {
        let url = self.config.page_url(&session.base_url, &self.config.paths.validate)?;
        let page = self.get_page(session, url, correlation_id).await?;

        let has_marker = Html::parse_document(&page.body)
            .select(&self.logged_in_marker)
            .next()
            .is_some();
        if has_marker {
            Ok(())
        } else {
            Err(PortalError::session_invalid("logged-in marker missing"))
        }
    }

    /// Fetches all courses with their assignments and schedule details.
    pub async fn fetch_grades(&self, id: &SessionId) -> Result<GradesResponse, PortalError> {
        let correlation_id = generate_correlation_id();
        info!(correlation_id = %correlation_id, session = %id, "Fetching grades");

        let start = Instant::now();
        let mut lease = self.sessions.checkout(id).await?;
        let result = self.grades_flow(&mut lease.session, &correlation_id).await;
        self.sessions.checkin(lease, result.as_ref().map(|_| ()));

        let grades = self.log_outcome(result, &correlation_id, start, "Grades fetch")?;
        Ok(grades_response(grades))
    }

    async fn grades_flow(
        &self,
        session: &mut Session,
        correlation_id: &str,
    ) -> Result<Vec<Course>, PortalError> {
        let url = self.config.page_url(&session.base_url, &self.config.paths.assignments)?;
        let page = self.get_page(session, url, correlation_id).await?;
        let mut courses = parse_grades_page(&page.body)?;

        let url = self.config.page_url(&session.base_url, &self.config.paths.classes)?;
        let page = self.get_page(session, url, correlation_id).await?;
        let classes = parse_classes_page(&page.body)?;
        apply_class_info(&mut courses, &classes);
        apply_course_gpas(&self.default_scale, &mut courses);

        debug!(
            correlation_id = %correlation_id,
            courses = courses.len(),
            classes = classes.len(),
            "Parsed grades"
        );
        Ok(courses)
    }

    /// Fetches the assignments of the course at `course_index` (page order).
    pub async fn fetch_assignments_for_course(
        &self,
        id: &SessionId,
        course_index: usize,
    ) -> Result<Vec<Assignment>, PortalError> {
        let correlation_id = generate_correlation_id();
        info!(
            correlation_id = %correlation_id,
            session = %id,
            course_index = course_index,
            "Fetching course assignments"
        );

        let start = Instant::now();
        let mut lease = self.sessions.checkout(id).await?;
        let result = async {
            let url = self
                .config
                .page_url(&lease.session.base_url, &self.config.paths.assignments)?;
            let page = self.get_page(&mut lease.session, url, &correlation_id).await?;
            parse_course_assignments(&page.body, course_index)
        }
        .await;
        self.sessions.checkin(lease, result.as_ref().map(|_| ()));

        self.log_outcome(result, &correlation_id, start, "Assignments fetch")
    }

    /// Fetches every grading cycle of the report card.
    ///
    /// Cycles load one postback at a time, each replaying the tokens of the
    /// page before it. A failing cycle fails the whole fetch.
    pub async fn fetch_report_card(&self, id: &SessionId) -> Result<ReportCard, PortalError> {
        let correlation_id = generate_correlation_id();
        info!(correlation_id = %correlation_id, session = %id, "Fetching report card");

        let start = Instant::now();
        let mut lease = self.sessions.checkout(id).await?;
        let result = self.report_card_flow(&mut lease.session, &correlation_id).await;
        self.sessions.checkin(lease, result.as_ref().map(|_| ()));

        self.log_outcome(result, &correlation_id, start, "Report card fetch")
    }

    async fn report_card_flow(
        &self,
        session: &mut Session,
        correlation_id: &str,
    ) -> Result<ReportCard, PortalError> {
        let url = self.config.page_url(&session.base_url, &self.config.paths.report_card)?;
        let mut latest = self.get_page(session, url, correlation_id).await?;
        let selector = parse_cycle_selector(&latest.body)?;

        let mut cycles = Vec::with_capacity(selector.options.len());
        for option in &selector.options {
            let cycle_name = option.display_name();
            let result = async {
                let rendered = parse_cycle_selector(&latest.body)?;
                if rendered.selected().map(|o| &o.value) != Some(&option.value) {
                    let form = build_cycle_postback(&latest.body, &latest.url, &rendered, option)?;
                    let action = form.action.clone();
                    latest = self
                        .send(session, PortalRequest::post_form(action, form.into_pairs()), correlation_id)
                        .await?;
                }
                parse_cycle_courses(&latest.body, option)
            }
            .await;

            let courses = match result {
                Ok(courses) => courses,
                Err(e) if e.needs_reauth() => return Err(e),
                Err(e) => {
                    warn!(
                        correlation_id = %correlation_id,
                        cycle = %cycle_name,
                        error = %e,
                        "Report card cycle failed"
                    );
                    return Err(PortalError::CycleFailed {
                        cycle: cycle_name,
                        source: Box::new(e),
                    });
                }
            };

            debug!(
                correlation_id = %correlation_id,
                cycle = %cycle_name,
                courses = courses.len(),
                "Parsed report card cycle"
            );
            cycles.push(ReportCardCycle {
                cycle_name,
                courses,
                average_gpa: None,
            });
        }

        let mut report = ReportCard {
            cycles,
            overall_gpa: None,
        };
        apply_report_card_gpas(&self.default_scale, &mut report);
        Ok(report)
    }

    /// Computes a GPA summary from supplied courses or the session's grades.
    pub async fn calculate_gpa(
        &self,
        id: Option<&SessionId>,
        request: GpaRequest,
    ) -> Result<GpaSummary, PortalError> {
        request.validate()?;

        let scale_name = request
            .scale
            .as_deref()
            .unwrap_or(&self.config.default_scale);
        let scale = self
            .scales
            .get(scale_name)
            .ok_or_else(|| PortalError::invalid_input(format!("unknown GPA scale '{scale_name}'")))?;
        let filter = CourseFilter::from_request(&request);

        let courses: Vec<CourseInput> = match request.courses {
            Some(courses) => courses,
            None => {
                let id = id.ok_or_else(|| {
                    PortalError::session_invalid("a session is required when no courses are supplied")
                })?;
                let grades = self.fetch_grades(id).await?;
                grades.grades.iter().map(CourseInput::from).collect()
            }
        };

        let mut summary = summarize(scale, &courses, &filter);

        if request.include_report_card {
            let id = id.ok_or_else(|| {
                PortalError::session_invalid("a session is required for report card GPA")
            })?;
            let report = self.fetch_report_card(id).await?;
            let cycles = cycle_gpas(scale, &report, &filter);
            summary.report_card_gpa =
                gpa::mean(cycles.iter().map(|c| c.gpa)).map(|g| round_to(g, 2));
            summary.cycles = Some(cycles);
        }

        info!(
            scale = %summary.scale,
            included = summary.included_courses,
            cumulative_gpa = ?summary.cumulative_gpa,
            "Calculated GPA"
        );
        Ok(summary)
    }

    /// Removes a session. Idempotent and infallible.
    ///
    /// When no request is in flight the portal session is also logged off;
    /// otherwise the in-flight request keeps the jar and its result is dropped.
    pub async fn destroy_session(&self, id: &SessionId) {
        let correlation_id = generate_correlation_id();

        let Some((mut session, guard)) = self.sessions.destroy(id) else {
            debug!(correlation_id = %correlation_id, session = %id, "Session already gone");
            return;
        };
        info!(correlation_id = %correlation_id, session = %id, "Destroyed session");

        let Some(_guard) = guard else {
            debug!(correlation_id = %correlation_id, session = %id, "Request in flight, skipping portal logoff");
            return;
        };

        let result = async {
            let url = self.config.page_url(&session.base_url, &self.config.paths.logoff)?;
            self.send(&mut session, PortalRequest::get(url), &correlation_id)
                .await
        }
        .await;
        if let Err(e) = result {
            warn!(correlation_id = %correlation_id, session = %id, error = %e, "Portal logoff failed");
        }
    }

    /// Sends a request with the session's jar.
    async fn send(
        &self,
        session: &mut Session,
        request: PortalRequest,
        correlation_id: &str,
    ) -> Result<PortalPage, PortalError> {
        self.transport
            .execute(&mut session.jar, request, correlation_id)
            .await
    }

    /// GETs an authenticated page, failing with `SessionInvalid` when the
    /// portal bounces the request to its login page.
    async fn get_page(
        &self,
        session: &mut Session,
        url: Url,
        correlation_id: &str,
    ) -> Result<PortalPage, PortalError> {
        let page = self.send(session, PortalRequest::get(url), correlation_id).await?;

        let login_url = self.config.page_url(&session.base_url, &self.config.paths.login)?;
        if page.url.path().eq_ignore_ascii_case(login_url.path()) || looks_like_login_page(&page.body)
        {
            warn!(
                correlation_id = %correlation_id,
                session = %session.id,
                url = %page.url,
                "Session expired - redirected to login"
            );
            return Err(PortalError::session_invalid("portal redirected to the login page"));
        }

        Ok(page)
    }

    fn log_outcome<T>(
        &self,
        result: Result<T, PortalError>,
        correlation_id: &str,
        start: Instant,
        operation: &str,
    ) -> Result<T, PortalError> {
        let duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(
                correlation_id = %correlation_id,
                duration_ms = duration_ms,
                "{} completed successfully",
                operation
            ),
            Err(e) if e.is_caller_error() => warn!(
                correlation_id = %correlation_id,
                error = %e,
                duration_ms = duration_ms,
                "{} rejected",
                operation
            ),
            Err(e) => error!(
                correlation_id = %correlation_id,
                error = %e,
                duration_ms = duration_ms,
                "{} failed",
                operation
            ),
        }
        result
    }
}

/// Wraps courses with the overall average and the course needing attention.
fn grades_response(grades: Vec<Course>) -> GradesResponse {
    let overall_average = gpa::mean(grades.iter().map(|c| c.numeric_grade)).map(|a| round_to(a, 2));
    let highlighted_course = grades
        .iter()
        .filter_map(|c| c.numeric_grade.map(|g| (g, c)))
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, c)| c.clone());

    GradesResponse {
        grades,
        overall_average,
        highlighted_course,
    }
}

fn parse_selector(css: &str) -> Result<Selector, PortalError> {
    Selector::parse(css)
        .map_err(|e| PortalError::invalid_input(format!("invalid CSS selector '{css}': {e}")))
}

/// Generates a unique correlation ID for request tracing.
fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros();
    let random: u32 = rand::thread_rng().gen();
    format!("{:x}-{:08x}", timestamp & 0xFFFFFFFF, random)
}
