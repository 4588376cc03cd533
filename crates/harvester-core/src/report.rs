use crate::aggregate::{EmailSet, GroupedEmails};
use serde::Serialize;
use std::collections::BTreeMap;

pub const BLANK_EMAIL: &str = "!blank!";
pub const NO_DOMAIN: &str = "!none!";

pub const LINE_SEP: &str = if cfg!(windows) { "\r\n" } else { "\n" };

#[derive(Debug, Default, Serialize)]
pub struct HarvestReport {
    pub repos: BTreeMap<String, RepoEmails>,
    pub emails: BTreeMap<String, BTreeMap<String, Vec<RepoRole>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepoEmails {
    pub repo_url: String,
    pub emails: BTreeMap<String, String>,
}

#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepoRole {
    pub repo_name: String,
    pub role: String,
    pub repo_url: String,
}

/// Returns the display email and its domain, using sentinels for blank or domain-less input.
pub fn split_domain(email: &str) -> (&str, &str) {
    if email.is_empty() {
        return (BLANK_EMAIL, NO_DOMAIN);
    }
    match email.rfind('@') {
        Some(at) if at > 0 => (email, &email[at + 1..]),
        _ => (email, NO_DOMAIN),
    }
}

pub fn build_report(grouped: &GroupedEmails) -> HarvestReport {
    let mut report = HarvestReport::default();
    for (key, role) in grouped {
        let (email, domain) = split_domain(&key.email);
        let label = role.label().to_string();

        report
            .repos
            .entry(key.repo.name.clone())
            .or_insert_with(|| RepoEmails {
                repo_url: key.repo.clone_url.clone(),
                emails: BTreeMap::new(),
            })
            .emails
            .insert(email.to_string(), label.clone());

        report
            .emails
            .entry(domain.to_string())
            .or_default()
            .entry(email.to_string())
            .or_default()
            .push(RepoRole {
                repo_name: key.repo.name.clone(),
                role: label,
                repo_url: key.repo.clone_url.clone(),
            });
    }
    for repos in report.emails.values_mut().flat_map(|by_email| by_email.values_mut()) {
        repos.sort_by(|a, b| a.repo_name.cmp(&b.repo_name).then(a.repo_url.cmp(&b.repo_url)));
    }
    report
}

pub fn render_email_list(emails: &EmailSet) -> String {
    let mut sorted: Vec<&str> = emails.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut out = String::new();
    for email in sorted {
        out.push_str(email);
        out.push_str(LINE_SEP);
    }
    out
}

pub fn render_report(report: &HarvestReport) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    report.serialize(&mut serializer)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::merge_association;
    use crate::model::{EmailAssociation, RepositoryRecord, Role};
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn grouped(entries: &[(&Arc<RepositoryRecord>, &str, Role)]) -> GroupedEmails {
        let mut grouped = GroupedEmails::new();
        for (repo, email, role) in entries {
            merge_association(
                &mut grouped,
                EmailAssociation {
                    repo: Arc::clone(repo),
                    email: email.to_string(),
                    role: *role,
                },
            );
        }
        grouped
    }

    #[test]
    fn split_domain_uses_sentinels() {
        assert_eq!(split_domain("ada@example.com"), ("ada@example.com", "example.com"));
        assert_eq!(split_domain("a@b@c.org"), ("a@b@c.org", "c.org"));
        assert_eq!(split_domain(""), (BLANK_EMAIL, NO_DOMAIN));
        assert_eq!(split_domain("localhost"), ("localhost", NO_DOMAIN));
        assert_eq!(split_domain("@nohost"), ("@nohost", NO_DOMAIN));
    }

    #[test]
    fn report_groups_by_repo_and_domain() {
        let alpha = Arc::new(RepositoryRecord::new("alpha", "https://x.test/alpha.git"));
        let beta = Arc::new(RepositoryRecord::new("beta", "https://x.test/beta.git"));
        let grouped = grouped(&[
            (&beta, "ada@example.com", Role::Committer),
            (&alpha, "ada@example.com", Role::Author),
            (&alpha, "ada@example.com", Role::Committer),
            (&alpha, "", Role::Author),
        ]);

        let report = build_report(&grouped);
        let value: Value = serde_json::from_slice(&render_report(&report).unwrap()).unwrap();
        assert_eq!(
            value["repos"]["alpha"],
            json!({
                "RepoUrl": "https://x.test/alpha.git",
                "Emails": { "ada@example.com": "Author+Committer", "!blank!": "Author" }
            })
        );
        assert_eq!(
            value["emails"]["example.com"]["ada@example.com"],
            json!([
                { "RepoName": "alpha", "Role": "Author+Committer", "RepoUrl": "https://x.test/alpha.git" },
                { "RepoName": "beta", "Role": "Committer", "RepoUrl": "https://x.test/beta.git" }
            ])
        );
        assert_eq!(value["emails"]["!none!"]["!blank!"][0]["RepoName"], "alpha");
    }

    #[test]
    fn report_is_tab_indented() {
        let repo = Arc::new(RepositoryRecord::new("r", "u"));
        let report = build_report(&grouped(&[(&repo, "a@x", Role::Author)]));
        let text = String::from_utf8(render_report(&report).unwrap()).unwrap();
        assert!(text.contains("\n\t\"emails\""));
    }

    #[test]
    fn email_list_is_sorted_one_per_line() {
        let emails: EmailSet = ["b@x", "a@x"].into_iter().map(String::from).collect();
        assert_eq!(render_email_list(&emails), format!("a@x{LINE_SEP}b@x{LINE_SEP}"));
        assert_eq!(render_email_list(&EmailSet::new()), "");
    }
}
