//! Job execution with bounded concurrency and bounded retry
//!
//! Each job runs under a global semaphore permit. One attempt writes its
//! outputs into a fresh scratch directory and delivers them; a transient
//! transport failure retries the whole attempt. Whatever the outcome, every
//! input file of the job is deleted from the cache afterwards.

use super::retry::{with_retry, Notifier, RetryPolicy, Retryable};
use super::traits::Transport;
use crate::cache::{CacheStore, Scratch};
use crate::codec::card;
use crate::codec::convert::ConvertPlan;
use crate::codec::table::Table;
use crate::codec::text;
use crate::codec::{concat_chunks, file_stem, CodecError, FileFormat};
use crate::state_machine::{ContactGroup, Job, JobOutcome, UploadedFile};
use crate::transport::TransportError;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

pub const SERVER_BUSY: &str = "Server is busy, please wait.";
pub const SERVER_ERROR: &str = "Server error, please try again.";
pub const DUPLICATES_REMOVED: &str = "Duplicate numbers have been removed.";
pub const NO_DUPLICATES: &str = "No duplicate numbers found.";

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Workspace error: {0}")]
    Io(#[from] std::io::Error),
}

impl Retryable for JobError {
    fn is_retryable(&self) -> bool {
        match self {
            JobError::Transport(e) => e.is_retryable(),
            JobError::Codec(_) | JobError::Io(_) => false,
        }
    }
}

/// What one successful attempt has to tell the user.
#[derive(Debug, Default)]
struct Report {
    summary: Option<String>,
    failed: Vec<String>,
}

impl Report {
    fn with_summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            failed: Vec::new(),
        }
    }

    /// Fold one file's result in. `Ok(false)` and non-transport errors mark
    /// the file failed; transport errors abort the attempt.
    fn settle(&mut self, file: &UploadedFile, result: Result<bool, JobError>) -> Result<(), JobError> {
        match result {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::info!(file = %file.original_name, "File produced no output");
                self.failed.push(file.original_name.clone());
                Ok(())
            }
            Err(JobError::Transport(e)) => Err(JobError::Transport(e)),
            Err(e) => {
                tracing::warn!(file = %file.original_name, error = %e, "File failed to process");
                self.failed.push(file.original_name.clone());
                Ok(())
            }
        }
    }
}

pub struct Orchestrator<T: Transport> {
    transport: Arc<T>,
    notifier: Arc<Notifier<T>>,
    cache: CacheStore,
    limiter: Arc<Semaphore>,
    policy: RetryPolicy,
    batch_cap: usize,
}

impl<T: Transport + 'static> Orchestrator<T> {
    pub fn new(
        transport: Arc<T>,
        notifier: Arc<Notifier<T>>,
        cache: CacheStore,
        max_concurrent_jobs: usize,
        policy: RetryPolicy,
        batch_cap: usize,
    ) -> Self {
        Self {
            transport,
            notifier,
            cache,
            limiter: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            policy,
            batch_cap,
        }
    }

    /// Run `job` to completion and tell the user how it went.
    pub async fn run(&self, chat_id: i64, job: Job) -> JobOutcome {
        let inputs: Vec<PathBuf> = job.files().iter().map(|f| f.path.clone()).collect();
        let outcome = match self.limiter.acquire().await {
            Ok(_permit) => self.run_permitted(chat_id, &job).await,
            Err(e) => {
                tracing::error!(job = job.label(), error = %e, "Job limiter closed");
                self.notifier.reply(chat_id, SERVER_ERROR).await;
                JobOutcome::Failed
            }
        };
        self.cache.discard(&inputs).await;
        outcome
    }

    async fn run_permitted(&self, chat_id: i64, job: &Job) -> JobOutcome {
        let files = job.files();
        let (batch, overflow) = files.split_at(files.len().min(self.batch_cap));
        if !overflow.is_empty() {
            tracing::info!(job = job.label(), skipped = overflow.len(), "Batch over the file cap");
        }

        let result = with_retry(&self.policy, job.label(), move |attempt| {
            self.attempt(chat_id, job, batch, attempt)
        })
        .await;

        match result {
            Ok(mut report) => {
                report
                    .failed
                    .extend(overflow.iter().map(|f| f.original_name.clone()));
                if let Some(summary) = &report.summary {
                    self.notifier.reply(chat_id, summary).await;
                }
                if !report.failed.is_empty() {
                    let message = format!(
                        "{} file(s) failed to process:\n{}",
                        report.failed.len(),
                        report.failed.join("\n")
                    );
                    self.notifier.reply(chat_id, &message).await;
                }
                tracing::info!(job = job.label(), failed = report.failed.len(), "Job completed");
                JobOutcome::Completed
            }
            Err(e) if e.is_retryable() => {
                self.notifier.reply(chat_id, SERVER_BUSY).await;
                JobOutcome::Busy
            }
            Err(e) => {
                tracing::error!(job = job.label(), error = %e, "Job failed");
                self.notifier.reply(chat_id, SERVER_ERROR).await;
                JobOutcome::Failed
            }
        }
    }

    async fn attempt(
        &self,
        chat_id: i64,
        job: &Job,
        batch: &[UploadedFile],
        attempt: u32,
    ) -> Result<Report, JobError> {
        tracing::info!(job = job.label(), attempt, files = batch.len(), "Running job");
        let scratch = self.cache.scratch().await?;
        let result = self.execute(chat_id, job, batch, &scratch).await;
        scratch.cleanup().await;
        result
    }

    #[allow(clippy::too_many_lines)]
    async fn execute(
        &self,
        chat_id: i64,
        job: &Job,
        batch: &[UploadedFile],
        scratch: &Scratch,
    ) -> Result<Report, JobError> {
        let out = Output {
            transport: &*self.transport,
            chat_id,
            scratch,
        };
        match job {
            Job::Convert {
                contact_name,
                file_name,
                policy,
                ..
            } => {
                let plan = ConvertPlan {
                    contact_name,
                    file_name,
                    policy: *policy,
                    multiple_inputs: batch.len() > 1,
                };
                let results = join_all(
                    batch
                        .iter()
                        .enumerate()
                        .map(|(index, file)| out.convert(&plan, index, file)),
                )
                .await;
                settle_all(Report::with_summary("All files have been sent."), batch, results)
            }

            Job::AdminNavy {
                admin,
                navy,
                file_name,
            } => {
                let mut contacts = numbered(admin);
                contacts.extend(numbered(navy));
                out.send_text_file(&format!("{file_name}.vcf"), &card::render(&contacts))
                    .await?;
                Ok(Report::with_summary("The .vcf file has been sent."))
            }

            Job::Manual { group, file_name } => {
                out.send_text_file(&format!("{file_name}.vcf"), &card::render(&numbered(group)))
                    .await?;
                Ok(Report::with_summary("The .vcf file has been sent."))
            }

            Job::Extract { .. } => {
                let results = join_all(batch.iter().map(|file| out.extract(file))).await;
                settle_all(Report::with_summary("The .txt file has been sent."), batch, results)
            }

            Job::AddContacts { group, .. } => {
                let cards = card::render(&numbered(group));
                let results = join_all(batch.iter().map(|file| out.add_contacts(file, &cards))).await;
                settle_all(Report::with_summary("The .vcf file has been sent."), batch, results)
            }

            Job::DeleteNumbers { needles, .. } => {
                let results = join_all(batch.iter().map(|file| out.delete_numbers(file, needles))).await;
                settle_all(Report::with_summary("All files have been sent."), batch, results)
            }

            Job::RenameContact {
                old_name, new_name, ..
            } => {
                let results = join_all(
                    batch
                        .iter()
                        .map(|file| out.rename_contact(file, old_name, new_name)),
                )
                .await;
                settle_all(Report::with_summary("The .vcf file has been sent."), batch, results)
            }

            Job::Dedupe { .. } => {
                let results = join_all(batch.iter().map(|file| out.dedupe(file))).await;
                let mut report = Report::default();
                let mut removed_any = false;
                for (file, result) in batch.iter().zip(results) {
                    let result = result.map(|sent| {
                        removed_any |= sent;
                        true
                    });
                    report.settle(file, result)?;
                }
                let summary = if removed_any { DUPLICATES_REMOVED } else { NO_DUPLICATES };
                report.summary = Some(summary.to_string());
                Ok(report)
            }

            Job::Count { .. } => {
                let mut report = Report::default();
                let mut lines = Vec::new();
                for file in batch {
                    let counted = count(file).await;
                    if let Ok(n) = &counted {
                        lines.push(format!("{}: {n}", file.original_name));
                    }
                    report.settle(file, counted.map(|_| true))?;
                }
                if !lines.is_empty() {
                    report.summary = Some(format!("Contact count per file:\n{}", lines.join("\n")));
                }
                Ok(report)
            }

            Job::RenameFiles { new_names, .. } => {
                let mut report = Report::with_summary("All files have been sent.");
                for (file, new_name) in batch.iter().zip(new_names) {
                    let result = out.rename_file(file, new_name).await;
                    report.settle(file, result)?;
                }
                Ok(report)
            }

            Job::Merge {
                format, file_name, ..
            } => out.merge(batch, *format, file_name).await,

            Job::Split { parts, .. } => {
                let mut report = Report::with_summary("All parts of the file have been sent.");
                for file in batch {
                    let result = out.split(file, *parts).await;
                    report.settle(file, result)?;
                }
                Ok(report)
            }

            Job::FormatNumbers { .. } => {
                let mut report = Report::with_summary("The .txt file has been sent.");
                for file in batch {
                    let result = out.format_numbers(file).await;
                    report.settle(file, result)?;
                }
                Ok(report)
            }
        }
    }
}

fn numbered(group: &ContactGroup) -> Vec<card::Contact> {
    card::numbered(&group.name, &group.numbers, 1)
}

fn settle_all(
    mut report: Report,
    batch: &[UploadedFile],
    results: Vec<Result<bool, JobError>>,
) -> Result<Report, JobError> {
    for (file, result) in batch.iter().zip(results) {
        report.settle(file, result)?;
    }
    Ok(report)
}

fn unsupported(file: &UploadedFile) -> JobError {
    JobError::Codec(CodecError::Unsupported(file.original_name.clone()))
}

async fn read_numbers(file: &UploadedFile) -> Result<Vec<String>, JobError> {
    match file.format() {
        Some(FileFormat::Text) => Ok(text::numbers(&text::read(&file.path).await?)),
        Some(FileFormat::Table) => Ok(Table::read(&file.path).await?.numbers()),
        _ => Err(unsupported(file)),
    }
}

async fn count(file: &UploadedFile) -> Result<usize, JobError> {
    match file.format() {
        Some(FileFormat::Text) => Ok(text::count_digit_tokens(&text::read(&file.path).await?)),
        Some(FileFormat::Card) => Ok(card::count_digit_tokens(&text::read(&file.path).await?)),
        Some(FileFormat::Table) => Ok(Table::read(&file.path).await?.count_digit_tokens()),
        None => Err(unsupported(file)),
    }
}

/// Where one attempt writes and delivers its outputs.
struct Output<'a, T: Transport> {
    transport: &'a T,
    chat_id: i64,
    scratch: &'a Scratch,
}

impl<T: Transport> Output<'_, T> {
    async fn send(&self, path: &Path) -> Result<(), JobError> {
        tracing::info!(chat_id = self.chat_id, file = %path.display(), "Sending document");
        self.transport.send_document(self.chat_id, path).await?;
        Ok(())
    }

    async fn send_text_file(&self, file_name: &str, content: &str) -> Result<(), JobError> {
        let path = self.scratch.output(file_name).await?;
        text::write(&path, content).await?;
        self.send(&path).await
    }

    async fn send_table(&self, file_name: &str, table: Table) -> Result<(), JobError> {
        let path = self.scratch.output(file_name).await?;
        table.write(&path).await?;
        self.send(&path).await
    }

    async fn convert(&self, plan: &ConvertPlan<'_>, index: usize, file: &UploadedFile) -> Result<bool, JobError> {
        let numbers = read_numbers(file).await?;
        let outputs = plan.files_for(index, &numbers);
        if outputs.is_empty() {
            return Ok(false);
        }
        for output in outputs {
            self.send_text_file(&format!("{}.vcf", output.stem), &card::render(&output.contacts))
                .await?;
        }
        Ok(true)
    }

    async fn extract(&self, file: &UploadedFile) -> Result<bool, JobError> {
        let numbers = card::extract_numbers(&text::read(&file.path).await?);
        if numbers.is_empty() {
            return Ok(false);
        }
        let name = format!("{}.txt", file_stem(&file.original_name));
        self.send_text_file(&name, &text::render_numbers(&numbers)).await?;
        Ok(true)
    }

    async fn add_contacts(&self, file: &UploadedFile, cards: &str) -> Result<bool, JobError> {
        let existing = text::read(&file.path).await?;
        self.send_text_file(&file.original_name, &card::prepend(cards, &existing))
            .await?;
        Ok(true)
    }

    async fn delete_numbers(&self, file: &UploadedFile, needles: &[String]) -> Result<bool, JobError> {
        match file.format() {
            Some(FileFormat::Text) => {
                let content = text::read(&file.path).await?;
                self.send_text_file(&file.original_name, &text::remove_matching(&content, needles))
                    .await?;
            }
            Some(FileFormat::Table) => {
                let mut table = Table::read(&file.path).await?;
                let removed = table.remove_matching(needles);
                tracing::debug!(file = %file.original_name, removed, "Removed rows");
                self.send_table(&file.original_name, table).await?;
            }
            _ => return Err(unsupported(file)),
        }
        Ok(true)
    }

    async fn rename_contact(&self, file: &UploadedFile, old: &str, new: &str) -> Result<bool, JobError> {
        let content = text::read(&file.path).await?;
        let (renamed, changed) = card::rename(&content, old, new);
        tracing::debug!(file = %file.original_name, changed, "Renamed contacts");
        self.send_text_file(&file.original_name, &renamed).await?;
        Ok(true)
    }

    /// Whether a deduplicated copy was sent. Files without duplicates are
    /// not sent back.
    async fn dedupe(&self, file: &UploadedFile) -> Result<bool, JobError> {
        match file.format() {
            Some(FileFormat::Table) => {
                let mut table = Table::read(&file.path).await?;
                if !table.dedupe_first_column() {
                    return Ok(false);
                }
                self.send_table(&file.original_name, table).await?;
            }
            Some(format) => {
                let content = text::read(&file.path).await?;
                let (deduped, removed) = match format {
                    FileFormat::Card => card::dedupe(&content),
                    _ => text::dedupe(&content),
                };
                if !removed {
                    return Ok(false);
                }
                self.send_text_file(&file.original_name, &deduped).await?;
            }
            None => return Err(unsupported(file)),
        }
        Ok(true)
    }

    async fn rename_file(&self, file: &UploadedFile, new_name: &str) -> Result<bool, JobError> {
        let format = file.format().ok_or_else(|| unsupported(file))?;
        let path = self
            .scratch
            .output(&format!("{new_name}{}", format.extension()))
            .await?;
        tokio::fs::copy(&file.path, &path).await?;
        self.send(&path).await?;
        Ok(true)
    }

    async fn merge(&self, batch: &[UploadedFile], format: FileFormat, file_name: &str) -> Result<Report, JobError> {
        let mut report = Report::with_summary(format!("The {format} file has been sent."));
        let output_name = format!("{file_name}{format}");
        match format {
            FileFormat::Table => {
                let mut tables = Vec::new();
                for file in batch {
                    let result = match file.format() {
                        Some(FileFormat::Table) => Table::read(&file.path).await.map_err(JobError::from),
                        _ => Err(unsupported(file)),
                    };
                    match result {
                        Ok(table) => tables.push(table),
                        Err(e) => {
                            report.settle(file, Err(e))?;
                        }
                    }
                }
                if tables.is_empty() {
                    report.summary = None;
                } else {
                    self.send_table(&output_name, Table::concat(&tables)).await?;
                }
            }
            FileFormat::Text | FileFormat::Card => {
                let mut chunks = Vec::new();
                for file in batch {
                    let result = if file.format() == Some(format) {
                        text::read(&file.path).await.map_err(JobError::from)
                    } else {
                        Err(unsupported(file))
                    };
                    match result {
                        Ok(content) => chunks.push(content),
                        Err(e) => {
                            report.settle(file, Err(e))?;
                        }
                    }
                }
                if chunks.is_empty() {
                    report.summary = None;
                } else {
                    self.send_text_file(&output_name, &concat_chunks(&chunks)).await?;
                }
            }
        }
        Ok(report)
    }

    /// Parts are named `{stem}_1`, `{stem}_2`, ...; empty parts are skipped.
    async fn split(&self, file: &UploadedFile, parts: usize) -> Result<bool, JobError> {
        let format = file.format().ok_or_else(|| unsupported(file))?;
        let stem = file_stem(&file.original_name);
        let part_name = |i: usize| format!("{stem}_{}{format}", i + 1);
        if format == FileFormat::Table {
            let table = Table::read(&file.path).await?;
            for (i, part) in table.split(parts).into_iter().enumerate() {
                if !part.rows.is_empty() {
                    self.send_table(&part_name(i), part).await?;
                }
            }
        } else {
            let content = text::read(&file.path).await?;
            let pieces = if format == FileFormat::Card {
                card::split(&content, parts)
            } else {
                text::split(&content, parts)
            };
            for (i, piece) in pieces.iter().enumerate() {
                if !piece.is_empty() {
                    self.send_text_file(&part_name(i), piece).await?;
                }
            }
        }
        Ok(true)
    }

    async fn format_numbers(&self, file: &UploadedFile) -> Result<bool, JobError> {
        if file.format() != Some(FileFormat::Text) {
            return Err(unsupported(file));
        }
        let sorted = text::frequency_sort(&text::read(&file.path).await?);
        self.send_text_file(&file.original_name, &text::render_numbers(&sorted))
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::convert::SplitPolicy;
    use crate::codec::table::Cell;
    use crate::runtime::testing::{test_policy, MockTransport};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        cache: CacheStore,
        transport: Arc<MockTransport>,
        orchestrator: Orchestrator<MockTransport>,
    }

    fn harness_with(transport: MockTransport, max_jobs: usize, batch_cap: usize) -> Harness {
        let dir = TempDir::new().unwrap();
        let cache = CacheStore::new(dir.path().join("cache"));
        let transport = Arc::new(transport);
        let notifier = Arc::new(Notifier::new(transport.clone(), test_policy()));
        let orchestrator = Orchestrator::new(
            transport.clone(),
            notifier,
            cache.clone(),
            max_jobs,
            test_policy(),
            batch_cap,
        );
        Harness {
            dir,
            cache,
            transport,
            orchestrator,
        }
    }

    fn harness() -> Harness {
        harness_with(MockTransport::new(), 50, 20)
    }

    impl Harness {
        async fn upload(&self, name: &str, content: &str) -> UploadedFile {
            let path = self.cache.reserve(name).await.unwrap();
            tokio::fs::write(&path, content).await.unwrap();
            UploadedFile {
                path,
                original_name: name.to_string(),
            }
        }

        async fn upload_table(&self, name: &str, table: &Table) -> UploadedFile {
            let path = self.cache.reserve(name).await.unwrap();
            table.clone().write(&path).await.unwrap();
            UploadedFile {
                path,
                original_name: name.to_string(),
            }
        }

        /// Read a delivered workbook back.
        async fn sent_table(&self, file_name: &str) -> Table {
            let doc = self.transport.document(file_name).unwrap();
            let path = self.dir.path().join(format!("sent-{file_name}"));
            tokio::fs::write(&path, &doc.content).await.unwrap();
            Table::read(&path).await.unwrap()
        }
    }

    fn sheet(header: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            header: header.iter().map(|h| Cell::from(*h)).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| Cell::from(*c)).collect())
                .collect(),
        }
    }

    fn group(name: &str, numbers: &[&str]) -> ContactGroup {
        ContactGroup {
            name: name.into(),
            numbers: numbers.iter().map(|n| (*n).to_string()).collect(),
        }
    }

    fn cards(numbers: &[&str]) -> String {
        let phones: Vec<String> = numbers.iter().map(|n| (*n).to_string()).collect();
        card::render(&card::numbered("Person", &phones, 1))
    }

    #[tokio::test]
    async fn convert_two_text_files_all_policy() {
        let h = harness();
        let a = h.upload("a.txt", "0811111111\n0811111112\n0811111113\n").await;
        let b = h.upload("b.txt", "0822222221\n0822222222\n0822222223\n").await;

        let outcome = h
            .orchestrator
            .run(
                1,
                Job::Convert {
                    files: vec![a.clone(), b.clone()],
                    contact_name: "Staff".into(),
                    file_name: "team".into(),
                    policy: SplitPolicy::All,
                },
            )
            .await;

        assert_eq!(outcome, JobOutcome::Completed);
        let mut names = h.transport.document_names();
        names.sort();
        assert_eq!(names, vec!["team1.vcf", "team2.vcf"]);
        let second = h.transport.document("team2.vcf").unwrap().text();
        assert_eq!(card::count_records(&second), 3);
        assert!(second.contains("FN:Staff B 1"));
        assert!(second.contains("FN:Staff B 3"));
        assert!(!second.contains("Staff A"));
        assert_eq!(h.transport.replies(), vec!["All files have been sent."]);
        assert!(!a.path.exists());
        assert!(!b.path.exists());
    }

    #[tokio::test]
    async fn split_card_file_front_loads_parts() {
        let h = harness();
        let numbers: Vec<String> = (0..10).map(|i| format!("08123456{i:02}")).collect();
        let refs: Vec<&str> = numbers.iter().map(String::as_str).collect();
        let file = h.upload("contacts.vcf", &cards(&refs)).await;

        h.orchestrator
            .run(1, Job::Split { files: vec![file], parts: 3 })
            .await;

        let docs = h.transport.documents();
        let names: Vec<&str> = docs.iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(names, vec!["contacts_1.vcf", "contacts_2.vcf", "contacts_3.vcf"]);
        let sizes: Vec<usize> = docs.iter().map(|d| card::count_records(&d.text())).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(h.transport.replies(), vec!["All parts of the file have been sent."]);
    }

    #[tokio::test]
    async fn dedupe_text_file() {
        let h = harness();
        let file = h.upload("nums.txt", "+111\n+222\n+111\n").await;

        h.orchestrator.run(1, Job::Dedupe { files: vec![file] }).await;

        let doc = h.transport.document("nums.txt").unwrap();
        assert_eq!(doc.text().lines().collect::<Vec<_>>(), vec!["+111", "+222"]);
        assert_eq!(h.transport.replies(), vec![DUPLICATES_REMOVED]);
    }

    #[tokio::test]
    async fn dedupe_without_duplicates_sends_nothing() {
        let h = harness();
        let file = h.upload("nums.txt", "+111\n+222\n").await;

        h.orchestrator.run(1, Job::Dedupe { files: vec![file] }).await;

        assert!(h.transport.documents().is_empty());
        assert_eq!(h.transport.replies(), vec![NO_DUPLICATES]);
    }

    #[tokio::test]
    async fn extract_without_numbers_is_a_failed_file() {
        let h = harness();
        let good = h.upload("good.vcf", &cards(&["+6281234567890"])).await;
        let empty = h.upload("empty.vcf", "BEGIN:VCARD\nFN:Nobody\nEND:VCARD\n").await;

        h.orchestrator
            .run(1, Job::Extract { files: vec![good, empty] })
            .await;

        assert_eq!(h.transport.document_names(), vec!["good.txt"]);
        assert_eq!(h.transport.document("good.txt").unwrap().text(), "6281234567890");
        assert_eq!(
            h.transport.replies(),
            vec![
                "The .txt file has been sent.".to_string(),
                "1 file(s) failed to process:\nempty.vcf".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn files_over_the_cap_fail_unopened() {
        let h = harness_with(MockTransport::new(), 50, 2);
        let mut files = Vec::new();
        for name in ["a.txt", "b.txt", "c.txt"] {
            files.push(h.upload(name, "0811111111\n").await);
        }
        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();

        h.orchestrator.run(1, Job::Count { files }).await;

        assert_eq!(
            h.transport.replies(),
            vec![
                "Contact count per file:\na.txt: 1\nb.txt: 1".to_string(),
                "1 file(s) failed to process:\nc.txt".to_string(),
            ]
        );
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn exhausted_timeouts_report_busy() {
        let h = harness();
        for _ in 0..10 {
            h.transport
                .queue_document_error(TransportError::timed_out("slow"));
        }
        let file = h.upload("nums.txt", "0811111111\n").await;
        let path = file.path.clone();

        let outcome = h
            .orchestrator
            .run(1, Job::FormatNumbers { files: vec![file] })
            .await;

        assert_eq!(outcome, JobOutcome::Busy);
        assert_eq!(h.transport.replies(), vec![SERVER_BUSY]);
        assert!(h.transport.documents().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn transient_timeout_retries_the_attempt() {
        let h = harness();
        h.transport
            .queue_document_error(TransportError::timed_out("slow"));
        let file = h.upload("nums.txt", "0822222222\n0811111111\n0822222222\n").await;

        let outcome = h
            .orchestrator
            .run(1, Job::FormatNumbers { files: vec![file] })
            .await;

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(
            h.transport.document("nums.txt").unwrap().text(),
            "+0822222222\n+0822222222\n+0811111111"
        );
    }

    #[tokio::test]
    async fn other_transport_errors_are_server_errors() {
        let h = harness();
        h.transport.queue_document_error(TransportError::api("Bad Request"));
        let outcome = h
            .orchestrator
            .run(
                1,
                Job::Manual {
                    group: ContactGroup {
                        name: "Guest".into(),
                        numbers: vec!["+0811111111".into()],
                    },
                    file_name: "guests".into(),
                },
            )
            .await;

        assert_eq!(outcome, JobOutcome::Failed);
        assert_eq!(h.transport.replies(), vec![SERVER_ERROR]);
    }

    #[tokio::test]
    async fn admin_navy_numbers_groups_independently() {
        let h = harness();
        h.orchestrator
            .run(
                1,
                Job::AdminNavy {
                    admin: ContactGroup {
                        name: "Admin".into(),
                        numbers: vec!["+0811111111".into(), "+0811111112".into()],
                    },
                    navy: ContactGroup {
                        name: "Navy".into(),
                        numbers: vec!["+0899999999".into()],
                    },
                    file_name: "crew".into(),
                },
            )
            .await;

        let doc = h.transport.document("crew.vcf").unwrap().text();
        assert!(doc.contains("FN:Admin 2"));
        assert!(doc.contains("FN:Navy 1"));
        assert_eq!(card::count_records(&doc), 3);
    }

    #[tokio::test]
    async fn merge_concatenates_in_upload_order() {
        let h = harness();
        let a = h.upload("a.txt", "0811111111").await;
        let b = h.upload("b.txt", "0822222222\n").await;

        h.orchestrator
            .run(
                1,
                Job::Merge {
                    files: vec![a, b],
                    format: FileFormat::Text,
                    file_name: "all".into(),
                },
            )
            .await;

        assert_eq!(
            h.transport.document("all.txt").unwrap().text(),
            "0811111111\n0822222222\n"
        );
        assert_eq!(h.transport.replies(), vec!["The .txt file has been sent."]);
    }

    #[tokio::test]
    async fn rename_files_keeps_extensions() {
        let h = harness();
        let a = h.upload("a.vcf", &cards(&["+0811111111"])).await;
        let b = h.upload("b.txt", "0811111111\n").await;

        h.orchestrator
            .run(
                1,
                Job::RenameFiles {
                    files: vec![a, b],
                    new_names: vec!["first".into(), "second".into()],
                },
            )
            .await;

        assert_eq!(h.transport.document_names(), vec!["first.vcf", "second.txt"]);
    }

    #[tokio::test]
    async fn delete_numbers_from_text() {
        let h = harness();
        let file = h.upload("list.txt", "0811111111\n0822222222\n0833333333\n").await;

        h.orchestrator
            .run(
                1,
                Job::DeleteNumbers {
                    files: vec![file],
                    needles: vec!["0822222222".into()],
                },
            )
            .await;

        assert_eq!(
            h.transport.document("list.txt").unwrap().text(),
            "0811111111\n0833333333\n"
        );
    }

    #[tokio::test]
    async fn add_contacts_puts_new_cards_first() {
        let h = harness();
        let file = h.upload("book.vcf", &cards(&["+0811111111", "+0811111112"])).await;

        let outcome = h
            .orchestrator
            .run(
                1,
                Job::AddContacts {
                    files: vec![file],
                    group: group("Guest", &["+0899999999"]),
                },
            )
            .await;

        assert_eq!(outcome, JobOutcome::Completed);
        let doc = h.transport.document("book.vcf").unwrap().text();
        assert_eq!(card::count_records(&doc), 3);
        let guest = doc.find("FN:Guest 1").unwrap();
        let person = doc.find("FN:Person 1").unwrap();
        assert!(guest < person);
        assert_eq!(h.transport.replies(), vec!["The .vcf file has been sent."]);
    }

    #[tokio::test]
    async fn rename_contact_touches_name_fields_only() {
        let h = harness();
        let content = "BEGIN:VCARD\nVERSION:3.0\nN:Person;;;\nFN:Person 1\nTEL:+0811111111\nNOTE:Person\nEND:VCARD\n";
        let file = h.upload("book.vcf", content).await;

        h.orchestrator
            .run(
                1,
                Job::RenameContact {
                    files: vec![file],
                    old_name: "Person".into(),
                    new_name: "Friend".into(),
                },
            )
            .await;

        let doc = h.transport.document("book.vcf").unwrap().text();
        assert!(doc.contains("N:Friend;;;\n"));
        assert!(doc.contains("FN:Friend 1\n"));
        assert!(doc.contains("NOTE:Person\n"));
        assert!(doc.contains("TEL:+0811111111\n"));
        assert_eq!(h.transport.replies(), vec!["The .vcf file has been sent."]);
    }

    #[tokio::test]
    async fn convert_reads_numbers_from_a_workbook() {
        let h = harness();
        let book = sheet(
            &["phone", "name"],
            &[&["0811111111", "a"], &["not a number", "b"], &["+62 822 2222 2222", "c"]],
        );
        let file = h.upload_table("book.xlsx", &book).await;

        h.orchestrator
            .run(
                1,
                Job::Convert {
                    files: vec![file],
                    contact_name: "Staff".into(),
                    file_name: "team".into(),
                    policy: SplitPolicy::All,
                },
            )
            .await;

        assert_eq!(h.transport.document_names(), vec!["team.vcf"]);
        let doc = h.transport.document("team.vcf").unwrap().text();
        assert_eq!(card::count_records(&doc), 2);
        assert!(doc.contains("TEL:+0811111111"));
        assert!(doc.contains("TEL:+6282222222222"));
    }

    #[tokio::test]
    async fn merge_workbooks_keeps_every_column() {
        let h = harness();
        let a = h
            .upload_table("a.xlsx", &sheet(&["phone", "name"], &[&["+0811111111", "ann"]]))
            .await;
        let b = h
            .upload_table(
                "b.xlsx",
                &sheet(&["phone", "city"], &[&["+0822222222", "bandung"], &["+0833333333", "bogor"]]),
            )
            .await;

        h.orchestrator
            .run(
                1,
                Job::Merge {
                    files: vec![a, b],
                    format: FileFormat::Table,
                    file_name: "all".into(),
                },
            )
            .await;

        assert_eq!(h.transport.document_names(), vec!["all.xlsx"]);
        let merged = h.sent_table("all.xlsx").await;
        assert_eq!(
            merged.header,
            vec![Cell::from("phone"), Cell::from("name"), Cell::from("city")]
        );
        assert_eq!(
            merged.first_column().collect::<Vec<_>>(),
            vec!["+0811111111", "+0822222222", "+0833333333"]
        );
        assert_eq!(merged.rows[0][1], Cell::from("ann"));
        assert_eq!(merged.rows[2][2], Cell::from("bogor"));
        assert_eq!(h.transport.replies(), vec!["The .xlsx file has been sent."]);
    }

    #[tokio::test]
    async fn split_workbook_repeats_the_header() {
        let h = harness();
        let book = sheet(
            &["phone"],
            &[&["+0811111111"], &["+0811111112"], &["+0811111113"], &["+0811111114"], &["+0811111115"]],
        );
        let file = h.upload_table("book.xlsx", &book).await;

        h.orchestrator
            .run(1, Job::Split { files: vec![file], parts: 2 })
            .await;

        assert_eq!(h.transport.document_names(), vec!["book_1.xlsx", "book_2.xlsx"]);
        let first = h.sent_table("book_1.xlsx").await;
        let second = h.sent_table("book_2.xlsx").await;
        assert_eq!(first.rows.len(), 3);
        assert_eq!(second.rows.len(), 2);
        assert_eq!(second.header, book.header);
        assert_eq!(second.first_column().next().unwrap(), "+0811111114");
    }

    #[tokio::test]
    async fn dedupe_workbook_keeps_first_rows() {
        let h = harness();
        let book = sheet(
            &["phone", "name"],
            &[&["+0811111111", "a"], &["+0822222222", "b"], &["+0811111111", "c"]],
        );
        let file = h.upload_table("book.xlsx", &book).await;

        h.orchestrator.run(1, Job::Dedupe { files: vec![file] }).await;

        let deduped = h.sent_table("book.xlsx").await;
        assert_eq!(deduped.rows.len(), 2);
        assert_eq!(deduped.rows[0][1], Cell::from("a"));
        assert_eq!(deduped.rows[1][1], Cell::from("b"));
        assert_eq!(h.transport.replies(), vec![DUPLICATES_REMOVED]);
    }

    #[tokio::test]
    async fn delete_numbers_from_workbook() {
        let h = harness();
        let book = sheet(
            &["phone", "name"],
            &[&["+62811111111", "a"], &["+62822222222", "b"], &["+62833333333", "c"]],
        );
        let file = h.upload_table("book.xlsx", &book).await;

        h.orchestrator
            .run(
                1,
                Job::DeleteNumbers {
                    files: vec![file],
                    needles: vec!["62822222222".into()],
                },
            )
            .await;

        let left = h.sent_table("book.xlsx").await;
        assert_eq!(
            left.first_column().collect::<Vec<_>>(),
            vec!["+62811111111", "+62833333333"]
        );
        assert_eq!(left.header, book.header);
        assert_eq!(h.transport.replies(), vec!["All files have been sent."]);
    }

    #[tokio::test]
    async fn count_covers_cards_and_workbooks() {
        let h = harness();
        let vcf = h
            .upload("cards.vcf", &cards(&["+0811111111", "+0811111112", "+0811111113"]))
            .await;
        let xlsx = h
            .upload_table(
                "book.xlsx",
                &sheet(&["phone"], &[&["+62811111111"], &["abc"], &["+62822222222"]]),
            )
            .await;

        h.orchestrator
            .run(1, Job::Count { files: vec![vcf, xlsx] })
            .await;

        assert_eq!(
            h.transport.replies(),
            vec!["Contact count per file:\ncards.vcf: 3\nbook.xlsx: 2"]
        );
    }

    async fn peak_for(max_jobs: usize) -> usize {
        let transport = MockTransport::new().with_document_delay(Duration::from_millis(50));
        let h = harness_with(transport, max_jobs, 20);
        let job = |name: &str| Job::Manual {
            group: group("Guest", &["+0811111111"]),
            file_name: name.into(),
        };

        let (first, second) = tokio::join!(
            h.orchestrator.run(1, job("first")),
            h.orchestrator.run(2, job("second")),
        );

        assert_eq!(first, JobOutcome::Completed);
        assert_eq!(second, JobOutcome::Completed);
        assert_eq!(h.transport.documents().len(), 2);
        h.transport.peak_documents_in_flight()
    }

    #[tokio::test]
    async fn single_permit_serialises_jobs() {
        assert_eq!(peak_for(1).await, 1);
    }

    #[tokio::test]
    async fn jobs_overlap_under_the_limit() {
        assert_eq!(peak_for(2).await, 2);
    }
}
