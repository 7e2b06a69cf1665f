//! Issue raising
//!
//! Every failing unit of work (document action, transfer, connection test)
//! produces exactly one issue. User-facing errors get a short summary only;
//! anything else also carries the error chain as a trace.

use crate::adapters::store::Session;
use crate::domain::{EdiError, Issue, IssueLinks, NewIssue, Result, Subject};
use std::error::Error as _;

/// What an issue is raised against
#[derive(Debug, Clone)]
pub struct IssueTarget {
    pub subject: Subject,
    pub links: IssueLinks,
    /// Display name used in the issue title
    pub name: String,
}

/// Full error chain of an unexpected failure
fn trace(err: &EdiError) -> String {
    let mut trace = format!("{err:?}");
    let mut source = err.source();
    while let Some(cause) = source {
        trace.push_str(&format!("\nCaused by: {cause}"));
        source = cause.source();
    }
    trace
}

/// Raises an issue on `target` for `err`
///
/// The title is `[<name>] <message>`, the summary `<context>: <message>`.
/// Both are also written to the subject's audit trail.
pub async fn raise_issue(
    session: &mut dyn Session,
    target: &IssueTarget,
    context: &str,
    err: &EdiError,
) -> Result<Issue> {
    let message = err.to_string();
    let summary = format!("{context}: {message}");
    let trace = if err.is_user_error() {
        tracing::warn!(subject = %target.subject, "{}", summary);
        None
    } else {
        let trace = trace(err);
        tracing::error!(subject = %target.subject, trace = %trace, "{}", summary);
        Some(trace)
    };

    let issue = session
        .create_issue(NewIssue {
            subject: target.subject.clone(),
            links: target.links.clone(),
            title: format!("[{}] {}", target.name, message),
            summary: summary.clone(),
            trace,
        })
        .await?;
    session.create_audit(&target.subject, &summary, &[]).await?;
    Ok(issue)
}
