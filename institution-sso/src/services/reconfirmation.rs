//! Affiliation reconfirmation window.
//!
//! Two authorities decide when an affiliation must be reconfirmed: the local
//! confirmation dates plus the institution's `maxConfirmationMonths`, and the
//! directory's own `last_day_to_reconfirm`/`past_reconfirm_date`. They can
//! disagree (the directory applies manual overrides and its own grace rules),
//! so a notice is due when either of them says so.

use chrono::{DateTime, Months, NaiveDate, TimeDelta, Utc};

use crate::models::{AffiliationRecord, Institution, ReconfirmationWindow, UserEmail};

#[derive(Debug, Clone, Copy, Default)]
pub struct AffiliationWindowCalculator {
    reconfirm_notification_days: Option<i64>,
}

impl AffiliationWindowCalculator {
    pub fn new(reconfirm_notification_days: Option<i64>) -> Self {
        Self {
            reconfirm_notification_days,
        }
    }

    pub fn compute(
        &self,
        email: &UserEmail,
        affiliation: &AffiliationRecord,
        is_sso_linked_email: bool,
    ) -> ReconfirmationWindow {
        self.compute_at(Utc::now(), email, affiliation, is_sso_linked_email)
    }

    pub fn compute_at(
        &self,
        now: DateTime<Utc>,
        email: &UserEmail,
        affiliation: &AffiliationRecord,
        is_sso_linked_email: bool,
    ) -> ReconfirmationWindow {
        compute_window_at(
            now,
            email,
            affiliation,
            self.reconfirm_notification_days,
            is_sso_linked_email,
        )
    }
}

pub fn compute_window(
    email: &UserEmail,
    affiliation: &AffiliationRecord,
    reconfirm_notification_days: Option<i64>,
    is_sso_linked_email: bool,
) -> ReconfirmationWindow {
    compute_window_at(
        Utc::now(),
        email,
        affiliation,
        reconfirm_notification_days,
        is_sso_linked_email,
    )
}

pub fn compute_window_at(
    now: DateTime<Utc>,
    email: &UserEmail,
    affiliation: &AffiliationRecord,
    reconfirm_notification_days: Option<i64>,
    is_sso_linked_email: bool,
) -> ReconfirmationWindow {
    let mut window = ReconfirmationWindow {
        cached_confirmed_at: affiliation.cached_confirmed_at.clone(),
        cached_reconfirmed_at: affiliation.cached_reconfirmed_at.clone(),
        cached_entitlement: affiliation.entitlement,
        cached_last_day_to_reconfirm: affiliation.last_day_to_reconfirm.clone(),
        cached_past_reconfirm_date: affiliation.past_reconfirm_date,
        ..Default::default()
    };

    let Some(days) = reconfirm_notification_days.filter(|days| *days > 0) else {
        return window;
    };

    // Only the email actually bound through SSO is reconfirmed for SSO institutions
    if affiliation.institution.sso_enabled && !is_sso_linked_email {
        return window;
    }

    // `None` when the notice period does not fit in a TimeDelta
    let notice = TimeDelta::try_days(days);

    window.local_deadline_due = local_deadline(email, &affiliation.institution)
        .is_some_and(|deadline| notice_reached(now, deadline, notice));

    window.directory_deadline_due = affiliation.past_reconfirm_date == Some(true)
        || affiliation
            .last_day_to_reconfirm
            .as_deref()
            .and_then(|raw| {
                let parsed = parse_directory_date(raw);
                if parsed.is_none() {
                    tracing::warn!(
                        email = %affiliation.email,
                        last_day_to_reconfirm = %raw,
                        "Unparseable last_day_to_reconfirm from directory"
                    );
                }
                parsed
            })
            .is_some_and(|last_day| notice_reached(now, last_day, notice));

    window.in_reconfirm_notification_period =
        window.local_deadline_due || window.directory_deadline_due;

    window
}

/// Whether `now` falls within `notice` of `deadline`. A notice period reaching
/// past the representable range always includes `now`.
fn notice_reached(now: DateTime<Utc>, deadline: DateTime<Utc>, notice: Option<TimeDelta>) -> bool {
    match notice.and_then(|notice| deadline.checked_sub_signed(notice)) {
        Some(start) => now >= start,
        None => true,
    }
}

/// Directory dates arrive as RFC 3339 timestamps or bare `YYYY-MM-DD` days
/// (read as midnight UTC).
pub fn parse_directory_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Last day of the current confirmation, derived from local dates.
pub fn local_deadline(email: &UserEmail, institution: &Institution) -> Option<DateTime<Utc>> {
    let baseline = email.reconfirmed_at.or(email.confirmed_at)?;
    let months = institution.max_confirmation_months?;
    baseline.checked_add_months(Months::new(months))
}
