//! View-independent shell state: what the answer pane, the log and the
//! file list show. The desktop view renders it and feeds it envelopes.

use std::path::{Path, PathBuf};

use core_types::{
    Envelope, HealthReport, OperationEvent, OperationFailure, OperationKind, OperationOutcome,
    OperationRequest, ProgressEvent, RequiredField,
};
use i18n::I18n;

use crate::ops::normalize_prefix;

#[derive(Debug, Clone, Default)]
pub struct ShellState {
    default_prefix: String,
    answer: String,
    log: Vec<String>,
    files: Vec<PathBuf>,
}

impl ShellState {
    pub fn new(default_prefix: impl Into<String>) -> Self {
        Self {
            default_prefix: default_prefix.into(),
            ..Self::default()
        }
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn clear_answer(&mut self) {
        self.answer.clear();
    }

    /// Appends the PDF paths in order. Returns how many were added and how
    /// many were skipped for not being PDFs.
    pub fn add_files(&mut self, paths: Vec<PathBuf>, i18n: &I18n) -> (usize, usize) {
        let mut added = 0;
        let mut skipped = 0;
        for path in paths {
            if is_pdf(&path) {
                self.files.push(path);
                added += 1;
            } else {
                skipped += 1;
            }
        }
        if added > 0 {
            self.push_log(i18n.tf("log.selected", &[("count", &added.to_string())]));
        }
        if skipped > 0 {
            self.push_log(i18n.tf("log.skipped", &[("count", &skipped.to_string())]));
        }
        (added, skipped)
    }

    pub fn clear_files(&mut self, i18n: &I18n) {
        self.files.clear();
        self.push_log(i18n.t("log.cleared").to_string());
    }

    /// Records that `request` was just dispatched.
    pub fn begin(&mut self, request: &OperationRequest, i18n: &I18n) {
        match request {
            OperationRequest::Ask(_) => {
                self.answer = i18n.t("ask.thinking").to_string();
            }
            OperationRequest::Validate(req) => {
                let region = req
                    .region
                    .clone()
                    .unwrap_or_else(|| i18n.t("config.region_default").to_string());
                self.push_log(i18n.tf(
                    "log.validate_start",
                    &[("kb", &req.knowledge_base_id), ("region", &region)],
                ));
            }
            OperationRequest::Upload(req) => {
                let prefix = normalize_prefix(&req.prefix, &self.default_prefix);
                self.push_log(i18n.tf(
                    "log.upload_start",
                    &[
                        ("count", &req.files.len().to_string()),
                        ("bucket", &req.bucket),
                        ("prefix", &prefix),
                    ],
                ));
            }
            OperationRequest::Sync(req) => {
                self.push_log(i18n.tf("log.sync_start", &[("kb", &req.knowledge_base_id)]));
            }
        }
    }

    /// Folds one accepted envelope into the visible state.
    pub fn apply(&mut self, envelope: &Envelope, i18n: &I18n) {
        match &envelope.event {
            OperationEvent::Progress(ProgressEvent::UploadStarted { path, .. }) => {
                let path = path.display().to_string();
                self.push_log(i18n.tf("log.upload_file", &[("path", &path)]));
            }
            OperationEvent::Progress(ProgressEvent::UploadFinished { uri, .. }) => {
                self.push_log(i18n.tf("log.upload_done", &[("uri", uri)]));
            }
            OperationEvent::Completed(OperationOutcome::Answer(text)) => {
                self.answer = text.clone();
            }
            OperationEvent::Completed(OperationOutcome::Health(report)) => {
                self.push_log(health_summary(report, i18n));
            }
            OperationEvent::Completed(OperationOutcome::SyncRequested { jobs }) => {
                self.push_log(i18n.tf("log.sync_accepted", &[("count", &jobs.len().to_string())]));
            }
            OperationEvent::Completed(OperationOutcome::Uploaded { count, .. }) => {
                self.push_log(i18n.tf("log.upload_summary", &[("count", &count.to_string())]));
            }
            OperationEvent::Failed(failure) => {
                let text = failure_text(envelope.kind, failure, i18n);
                if envelope.kind == OperationKind::Ask {
                    self.answer = text;
                } else {
                    self.push_log(text);
                }
            }
        }
    }

    fn push_log(&mut self, line: String) {
        self.log.push(line);
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Multi-line health text. The same report always renders the same text,
/// and an empty data-source list is stated rather than left blank.
pub fn health_summary(report: &HealthReport, i18n: &I18n) -> String {
    let mut lines = vec![i18n.tf(
        "report.kb_status",
        &[("id", &report.knowledge_base_id), ("status", &report.status)],
    )];
    if report.data_sources.is_empty() {
        lines.push(i18n.t("report.ds_none").to_string());
    } else {
        lines.push(i18n.tf(
            "report.ds_count",
            &[("count", &report.data_sources.len().to_string())],
        ));
        for source in &report.data_sources {
            let mut line = match source.name.as_deref().filter(|name| !name.is_empty()) {
                Some(name) => format!("  - {name} ({})", source.id),
                None => format!("  - {}", source.id),
            };
            if let Some(status) = &source.status {
                line.push_str(&format!(" {status}"));
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}

pub fn failure_text(kind: OperationKind, failure: &OperationFailure, i18n: &I18n) -> String {
    let title = i18n.t(&format!("fail.{kind}")).to_string();
    match failure {
        OperationFailure::Service { code, message } => format!("{title} {code}: {message}"),
        OperationFailure::Unexpected { message, trace } => {
            format!("{title} {message}\n\n{trace}")
        }
    }
}

pub fn missing_field_text(field: RequiredField, i18n: &I18n) -> String {
    i18n.t(&format!("missing.{}", field.as_str())).to_string()
}

pub fn status_text(running: &[OperationKind], i18n: &I18n) -> String {
    if running.is_empty() {
        return i18n.t("status.idle").to_string();
    }
    let kinds = running
        .iter()
        .map(|kind| i18n.t(&format!("kind.{kind}")).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    i18n.tf("status.running", &[("kinds", &kinds)])
}

#[cfg(test)]
mod tests {
    use core_types::{DataSourceSummary, SessionConfig, UiLanguage};

    use super::*;

    fn en() -> I18n {
        I18n::new(UiLanguage::EnUs)
    }

    fn envelope(kind: OperationKind, event: OperationEvent) -> Envelope {
        Envelope { id: 1, kind, event }
    }

    fn report(sources: Vec<DataSourceSummary>) -> HealthReport {
        HealthReport {
            knowledge_base_id: "KB123".to_string(),
            status: "ACTIVE".to_string(),
            data_sources: sources,
        }
    }

    #[test]
    fn health_summary_states_missing_data_sources() {
        let text = health_summary(&report(Vec::new()), &en());
        assert_eq!(
            text,
            "[KB] ID=KB123, status=ACTIVE\n[KB] Data sources: none (add an S3 data source)"
        );
    }

    #[test]
    fn health_summary_is_stable_for_the_same_report() {
        let report = report(vec![DataSourceSummary {
            id: "DS1".to_string(),
            name: Some("lectures".to_string()),
            status: Some("AVAILABLE".to_string()),
        }]);
        let first = health_summary(&report, &en());
        let second = health_summary(&report, &en());
        assert_eq!(first, second);
        assert!(first.ends_with("  - lectures (DS1) AVAILABLE"));
    }

    #[test]
    fn unnamed_data_sources_show_their_id_once() {
        let text = health_summary(
            &report(vec![
                DataSourceSummary {
                    id: "DS1".to_string(),
                    name: Some("lectures".to_string()),
                    status: None,
                },
                DataSourceSummary {
                    id: "DS2".to_string(),
                    name: None,
                    status: Some("AVAILABLE".to_string()),
                },
            ]),
            &en(),
        );
        let lines: Vec<_> = text.lines().skip(2).collect();
        assert_eq!(lines, vec!["  - lectures (DS1)", "  - DS2 AVAILABLE"]);
    }

    #[test]
    fn add_files_keeps_pdfs_in_order() {
        let mut shell = ShellState::new("documents/");
        let (added, skipped) = shell.add_files(
            vec![
                PathBuf::from("/notes/ch2.pdf"),
                PathBuf::from("/notes/slides.pptx"),
                PathBuf::from("/notes/ch1.PDF"),
            ],
            &en(),
        );
        assert_eq!((added, skipped), (2, 1));
        assert_eq!(
            shell.files(),
            &[PathBuf::from("/notes/ch2.pdf"), PathBuf::from("/notes/ch1.PDF")]
        );
        assert_eq!(shell.log().len(), 2);

        shell.clear_files(&en());
        assert!(shell.files().is_empty());
    }

    #[test]
    fn upload_progress_renders_in_order() {
        let i18n = en();
        let mut shell = ShellState::new("documents/");
        let session = SessionConfig {
            bucket: "course-docs".to_string(),
            ..SessionConfig::default()
        };
        shell.begin(
            &OperationRequest::upload(&session, vec![PathBuf::from("/notes/a.pdf")]),
            &i18n,
        );
        for event in [
            OperationEvent::Progress(ProgressEvent::UploadStarted {
                index: 0,
                total: 1,
                path: PathBuf::from("/notes/a.pdf"),
            }),
            OperationEvent::Progress(ProgressEvent::UploadFinished {
                index: 0,
                total: 1,
                uri: "s3://course-docs/documents/a.pdf".to_string(),
            }),
            OperationEvent::Completed(OperationOutcome::Uploaded {
                count: 1,
                uris: vec!["s3://course-docs/documents/a.pdf".to_string()],
            }),
        ] {
            shell.apply(&envelope(OperationKind::Upload, event), &i18n);
        }

        assert_eq!(
            shell.log(),
            &[
                "[Upload start] 1 file(s) -> s3://course-docs/documents/".to_string(),
                "[Upload] /notes/a.pdf ...".to_string(),
                "[Done] s3://course-docs/documents/a.pdf".to_string(),
                "[Upload complete] 1 file(s) uploaded".to_string(),
            ]
        );
    }

    #[test]
    fn ask_failure_replaces_the_answer() {
        let i18n = en();
        let mut shell = ShellState::new("documents/");
        shell.begin(
            &OperationRequest::ask(&SessionConfig::default(), "q", false),
            &i18n,
        );
        assert_eq!(shell.answer(), i18n.t("ask.thinking"));

        shell.apply(
            &envelope(
                OperationKind::Ask,
                OperationEvent::Failed(OperationFailure::Service {
                    code: "AccessDeniedException".to_string(),
                    message: "not authorized".to_string(),
                }),
            ),
            &i18n,
        );
        assert_eq!(
            shell.answer(),
            "[Question failed] AccessDeniedException: not authorized"
        );
        assert!(shell.log().is_empty());
    }

    #[test]
    fn status_lists_running_kinds() {
        let i18n = en();
        assert_eq!(status_text(&[], &i18n), "Idle");
        assert_eq!(
            status_text(&[OperationKind::Validate, OperationKind::Upload], &i18n),
            "Running: check, upload"
        );
        assert_eq!(
            missing_field_text(RequiredField::Bucket, &i18n),
            i18n.t("missing.bucket")
        );
    }
}
