//! Batch deduplication on the upsert key.

use std::collections::HashSet;

use jobradar_shared::Job;

/// Keep the first occurrence of each `(source, source_job_id)`, preserving
/// order. Returns the surviving jobs and how many were dropped.
pub fn deduplicate(jobs: Vec<Job>) -> (Vec<Job>, usize) {
    let mut seen = HashSet::with_capacity(jobs.len());
    let before = jobs.len();
    let kept: Vec<Job> = jobs.into_iter().filter(|job| seen.insert(job.key())).collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobradar_shared::{Source, content_hash};

    fn job(source: Source, id: &str, title: &str) -> Job {
        Job {
            company: "Telstra".into(),
            title: title.into(),
            location: "Melbourne".into(),
            url: format!("https://example.com/{id}"),
            description: String::new(),
            department: String::new(),
            track: None,
            source,
            source_job_id: id.into(),
            posted_at: None,
            content_hash: content_hash(source, "Telstra", title, "Melbourne", id),
            company_id: None,
            is_active: true,
        }
    }

    #[test]
    fn first_seen_wins() {
        let (kept, dropped) = deduplicate(vec![
            job(Source::Seek, "1", "CTO"),
            job(Source::Seek, "2", "CIO"),
            job(Source::Seek, "1", "CTO (updated)"),
        ]);
        assert_eq!(dropped, 1);
        let titles: Vec<&str> = kept.iter().map(|j| j.title.as_str()).collect();
        assert_eq!(titles, vec!["CTO", "CIO"]);
    }

    #[test]
    fn key_includes_source() {
        let (kept, dropped) = deduplicate(vec![
            job(Source::Seek, "1", "CTO"),
            job(Source::Linkedin, "1", "CTO"),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn idempotent() {
        let batch = vec![
            job(Source::Lever, "a", "Head of Data"),
            job(Source::Lever, "a", "Head of Data"),
            job(Source::Lever, "b", "Director"),
        ];
        let (once, _) = deduplicate(batch);
        let (twice, dropped) = deduplicate(once.clone());
        assert_eq!(once, twice);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn empty_batch() {
        let (kept, dropped) = deduplicate(Vec::new());
        assert!(kept.is_empty());
        assert_eq!(dropped, 0);
    }
}
