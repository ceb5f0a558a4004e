//! Output formatting utilities

use crate::application::apply_tags::{ApplyOutcome, ApplyReport, SubmissionState};
use crate::application::load_submissions::{SyncReport, SyncStatus};
use crate::domain::Submission;

fn submission_line(submission: &Submission) -> String {
    format!(
        "{} - {}, {}",
        submission.key(),
        submission.posted_at.format("%Y-%m-%d"),
        submission.title
    )
}

/// Format matched submissions for display, one per line plus a count
pub fn format_submission_list(submissions: &[Submission]) -> String {
    if submissions.is_empty() {
        return "No matching submissions".to_string();
    }

    let mut output = String::new();
    for submission in submissions {
        let tags: Vec<&str> = submission.tags.iter().map(String::as_str).collect();
        output.push_str(&format!(
            "{}: {}\n",
            submission_line(submission),
            tags.join(", ")
        ));
    }
    output.push_str(&format!("{} submission(s) matched", submissions.len()));
    output
}

fn outcome_status(outcome: &ApplyOutcome, dry_run: bool) -> String {
    match &outcome.state {
        SubmissionState::Pending if dry_run => "would be updated".to_string(),
        SubmissionState::Confirmed { .. } => "updated".to_string(),
        SubmissionState::Failed { reason, .. } => format!("failed: {}", reason),
        SubmissionState::Cancelled => "cancelled".to_string(),
        other => format!("{:?}", other).to_lowercase(),
    }
}

/// Format the per-submission changes and summary of an apply run
pub fn format_apply_report(report: &ApplyReport) -> String {
    let mut output = String::new();

    for outcome in report.changed() {
        output.push_str(&format!(
            "{} [{}]\n",
            submission_line(&outcome.submission),
            outcome_status(outcome, report.dry_run)
        ));
        for tag in &outcome.diff.add {
            output.push_str(&format!("  +{}\n", tag));
        }
        for tag in &outcome.diff.remove {
            output.push_str(&format!("  -{}\n", tag));
        }
    }

    if report.dry_run {
        output.push_str(&format!(
            "Dry run: {} submission(s) would be updated, {} already up to date",
            report.planned(),
            report.noop()
        ));
        return output;
    }

    output.push_str(&format!(
        "Confirmed: {}, Failed: {}, NoOp: {}, Cancelled: {}",
        report.confirmed(),
        report.failed(),
        report.noop(),
        report.cancelled()
    ));

    let failures: Vec<String> = report
        .outcomes
        .iter()
        .filter_map(|outcome| match &outcome.state {
            SubmissionState::Failed { reason, .. } => {
                Some(format!("  {}: {}", outcome.submission.key(), reason))
            }
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        output.push_str("\nFailures:\n");
        output.push_str(&failures.join("\n"));
    }

    output
}

/// Format one line per synced service
pub fn format_sync_report(report: &SyncReport) -> String {
    let lines: Vec<String> = report
        .services
        .iter()
        .map(|service| {
            let progress = format!(
                "{}: {} submission(s) in {} page(s)",
                service.service, service.submissions, service.pages
            );
            match &service.status {
                SyncStatus::Completed { pruned: 0 } => progress,
                SyncStatus::Completed { pruned } => format!("{}, {} removed", progress, pruned),
                SyncStatus::Aborted { reason } => format!("{}, aborted: {}", progress, reason),
                SyncStatus::Cancelled => format!("{}, cancelled", progress),
            }
        })
        .collect();

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::load_submissions::ServiceSyncReport;
    use crate::domain::{Diff, Service, TagSet};
    use chrono::{TimeZone, Utc};

    fn tags(list: &[&str]) -> TagSet {
        list.iter().map(|t| t.to_string()).collect()
    }

    fn submission(id: i64, list: &[&str]) -> Submission {
        Submission {
            service: Service::FurAffinity,
            id,
            title: "Morning Flight".to_string(),
            posted_at: Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap(),
            tags: tags(list),
        }
    }

    fn outcome(id: i64, state: SubmissionState) -> ApplyOutcome {
        ApplyOutcome {
            submission: submission(id, &["old", "keep"]),
            diff: Diff {
                add: tags(&["new"]),
                remove: tags(&["old"]),
            },
            state,
        }
    }

    #[test]
    fn test_format_empty_list() {
        assert_eq!(format_submission_list(&[]), "No matching submissions");
    }

    #[test]
    fn test_format_submission_list() {
        let output = format_submission_list(&[submission(12, &["sky", "dragon"])]);
        assert_eq!(
            output,
            "FurAffinity-12 - 2020-05-06, Morning Flight: dragon, sky\n1 submission(s) matched"
        );
    }

    #[test]
    fn test_format_dry_run_report() {
        let report = ApplyReport {
            dry_run: true,
            outcomes: vec![
                outcome(1, SubmissionState::Pending),
                outcome(2, SubmissionState::NoOp),
            ],
        };

        let output = format_apply_report(&report);
        assert!(output.contains("FurAffinity-1 - 2020-05-06, Morning Flight [would be updated]"));
        assert!(output.contains("  +new\n  -old\n"));
        assert!(!output.contains("FurAffinity-2"));
        assert!(output.ends_with("1 submission(s) would be updated, 1 already up to date"));
    }

    #[test]
    fn test_format_live_report_lists_failures() {
        let report = ApplyReport {
            dry_run: false,
            outcomes: vec![
                outcome(
                    1,
                    SubmissionState::Confirmed {
                        tags: tags(&["new", "keep"]),
                    },
                ),
                outcome(
                    2,
                    SubmissionState::Failed {
                        reason: "404 not found".to_string(),
                        attempts: 1,
                    },
                ),
                outcome(3, SubmissionState::Cancelled),
            ],
        };

        let output = format_apply_report(&report);
        assert!(output.contains("Confirmed: 1, Failed: 1, NoOp: 0, Cancelled: 1"));
        assert!(output.contains("Failures:\n  FurAffinity-2: 404 not found"));
        assert!(output.contains("[updated]"));
    }

    #[test]
    fn test_format_sync_report() {
        let report = SyncReport {
            services: vec![
                ServiceSyncReport {
                    service: Service::FurAffinity,
                    pages: 1,
                    submissions: 10,
                    status: SyncStatus::Aborted {
                        reason: "403 Forbidden".to_string(),
                    },
                },
                ServiceSyncReport {
                    service: Service::Weasyl,
                    pages: 3,
                    submissions: 250,
                    status: SyncStatus::Completed { pruned: 2 },
                },
            ],
        };

        assert_eq!(
            format_sync_report(&report),
            "FurAffinity: 10 submission(s) in 1 page(s), aborted: 403 Forbidden\n\
             Weasyl: 250 submission(s) in 3 page(s), 2 removed"
        );
    }
}
