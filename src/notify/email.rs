//! Email notifications.
//!
//! [`EmailNotifier`] turns a [`NotificationKind`] into an [`EmailMessage`]
//! and hands it to a [`Mailer`]. Managers are looked up in the
//! [`RoleDirectory`] on every call, so role changes take effect on the next
//! notification.

use std::sync::Arc;

use async_trait::async_trait;

use super::{NotificationKind, Notifier};
use crate::domain::person::Person;
use crate::domain::request::RequirementsRequest;
use crate::error::Result;
use crate::mail::{EmailMessage, Mailer};
use crate::roles::{RoleDirectory, RoleType};

/// Which page of the site a link should open.
#[derive(Debug, Clone, Copy)]
enum Page {
    Review,
    View,
}

/// Notifier that emails the parties of a request.
pub struct EmailNotifier<M: Mailer, D: RoleDirectory> {
    mailer: Arc<M>,
    directory: Arc<D>,
    site_url: String,
}

impl<M: Mailer, D: RoleDirectory> EmailNotifier<M, D> {
    /// Create a notifier whose links point under `site_url`.
    pub fn new(mailer: Arc<M>, directory: Arc<D>, site_url: impl Into<String>) -> Self {
        Self {
            mailer,
            directory,
            site_url: site_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn link(&self, request: &RequirementsRequest, page: Page) -> String {
        let page = match page {
            Page::Review => "Review",
            Page::View => "View",
        };
        format!(
            r#"<a href="{}/Requests/{}/{}">here</a>"#,
            self.site_url, page, request.id
        )
    }

    /// Build the message for `kind`, or `None` when nobody would receive it.
    fn compose(
        &self,
        kind: &NotificationKind,
        request: &RequirementsRequest,
        comment: Option<&str>,
        managers: Vec<Person>,
    ) -> Option<EmailMessage> {
        let fid = request.formatted_id();
        let comment_line = comment
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| format!("\nThe comment left was \"{}\".\n", escape_html(c)))
            .unwrap_or_default();

        let (to, cc, subject, body) = match kind {
            NotificationKind::Submitted => (
                vec![request.approving_peo.clone()],
                managers,
                format!("Request {} Submitted", fid),
                format!(
                    "Hello, a requirements request has been submitted for which you are the approving official by {}.\n\n\
                     To review/approve the request, please click {}.",
                    escape_html(&request.requester.display_name),
                    self.link(request, Page::Review)
                ),
            ),
            NotificationKind::Approved => {
                let mut to = managers;
                if !request.requester.is_same_person(&request.approving_peo) {
                    to.push(request.requester.clone());
                }
                let approver_comment = request
                    .peo_approved_comment
                    .as_deref()
                    .map(|c| format!("\nThe approver left a comment saying \"{}\".\n", escape_html(c)))
                    .unwrap_or_default();
                (
                    to,
                    Vec::new(),
                    format!("Request {} Approved", fid),
                    format!(
                        "Hello, requirements request {} for {} has been approved by the approving official {}.\n{}\n\
                         To view the request and any comments/modifications left by the approver, please click {}.",
                        fid,
                        escape_html(request.data.application_name()),
                        escape_html(&request.approving_peo.display_name),
                        approver_comment,
                        self.link(request, Page::View)
                    ),
                )
            }
            NotificationKind::Rejected { status } => (
                vec![request.requester.clone()],
                managers,
                format!("Request {} {}", fid, status),
                format!(
                    "Hello, requirements request {} for {} has been {}.\n{}\n\
                     To view the request, please click {}.",
                    fid,
                    escape_html(request.data.application_name()),
                    status.as_str().to_lowercase(),
                    comment_line,
                    self.link(request, Page::View)
                ),
            ),
            NotificationKind::Cancelled => (
                vec![request.requester.clone(), request.approving_peo.clone()],
                managers,
                format!("Request {} Cancelled", fid),
                format!(
                    "Hello, requirements request {} ({}) has been cancelled.\n{}\n\
                     To view the request, please click {}.",
                    fid,
                    escape_html(&request.data.title),
                    comment_line,
                    self.link(request, Page::View)
                ),
            ),
            NotificationKind::StatusChanged { from, to } => (
                vec![request.requester.clone()],
                managers,
                format!("Request {} Status Changed to {}", fid, to),
                format!(
                    "Hello, the status of requirements request {} ({}) has changed from {} to {}.\n{}\n\
                     To view the request, please click {}.",
                    fid,
                    escape_html(&request.data.title),
                    from,
                    to,
                    comment_line,
                    self.link(request, Page::View)
                ),
            ),
            NotificationKind::NoteAdded(note) => (
                vec![request.approving_peo.clone(), request.requester.clone()],
                Vec::new(),
                format!("Note Added for Request {}", fid),
                format!(
                    "Hello, a note has been added to your requirements request {}\n\n\
                     The note is:\n<h4>{}</h4><p>\"{}\"</p>\n\n\
                     To review the request/note, please click {}.",
                    escape_html(&request.data.title),
                    escape_html(&note.title),
                    escape_html(&note.text),
                    self.link(request, Page::Review)
                ),
            ),
        };

        let to = dedup(to);
        if to.is_empty() {
            return None;
        }
        let cc = dedup(cc)
            .into_iter()
            .filter(|person| !to.iter().any(|t| t.is_same_person(person)))
            .collect();

        Some(EmailMessage {
            to,
            cc,
            subject,
            body,
        })
    }
}

/// Escape text typed by users before it goes into an HTML body.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn dedup(people: Vec<Person>) -> Vec<Person> {
    let mut unique: Vec<Person> = Vec::with_capacity(people.len());
    for person in people {
        if !unique.iter().any(|p| p.is_same_person(&person)) {
            unique.push(person);
        }
    }
    unique
}

#[async_trait]
impl<M: Mailer, D: RoleDirectory> Notifier for EmailNotifier<M, D> {
    #[tracing::instrument(skip(self, kind, request, comment), fields(request_id = %request.id, kind = kind.label()))]
    async fn notify(
        &self,
        kind: NotificationKind,
        request: &RequirementsRequest,
        comment: Option<&str>,
    ) -> Result<()> {
        let managers = self.directory.users_with_role(RoleType::Manager).await?;

        let Some(message) = self.compose(&kind, request, comment, managers) else {
            tracing::debug!("No recipients, skipping email");
            return Ok(());
        };

        self.mailer.send(&message).await?;
        tracing::debug!(
            subject = %message.subject,
            to = message.to.len(),
            cc = message.cc.len(),
            "Sent notification email"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::RequestStatus;
    use crate::domain::request::state::fixtures::{peo, requester, saved};
    use crate::domain::{Note, NoteId};
    use crate::mail::MockMailer;
    use crate::roles::InMemoryRoleDirectory;

    fn manager() -> Person {
        Person::new(20, "Board Member", "board@example.com")
    }

    fn setup() -> (
        EmailNotifier<MockMailer, InMemoryRoleDirectory>,
        Arc<MockMailer>,
        Arc<InMemoryRoleDirectory>,
    ) {
        let mailer = Arc::new(MockMailer::new());
        let directory = Arc::new(InMemoryRoleDirectory::new());
        directory.grant(manager(), RoleType::Manager);
        let notifier = EmailNotifier::new(mailer.clone(), directory.clone(), "https://reqtrack.example.com/");
        (notifier, mailer, directory)
    }

    fn ids(people: &[Person]) -> Vec<i64> {
        people.iter().map(|p| p.id.0).collect()
    }

    #[tokio::test]
    async fn test_submitted_goes_to_peo_copying_managers() {
        let (notifier, mailer, _) = setup();
        let request = saved(7, RequestStatus::Submitted);

        notifier.notify(NotificationKind::Submitted, &request, None).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Request 0007 Submitted");
        assert_eq!(ids(&sent[0].to), vec![peo().id.0]);
        assert_eq!(ids(&sent[0].cc), vec![manager().id.0]);
        assert!(sent[0].body.contains("https://reqtrack.example.com/Requests/Review/7"));
        assert!(sent[0].body.contains("Jeremy Clark"));
    }

    #[tokio::test]
    async fn test_approved_goes_to_managers_and_requester() {
        let (notifier, mailer, _) = setup();
        let mut request = saved(7, RequestStatus::Approved);
        request.peo_approved_comment = Some("Fund it".to_string());

        notifier.notify(NotificationKind::Approved, &request, None).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(sent[0].subject, "Request 0007 Approved");
        assert_eq!(ids(&sent[0].to), vec![manager().id.0, requester().id.0]);
        assert!(sent[0].cc.is_empty());
        assert!(sent[0].body.contains("Fund it"));
        assert!(sent[0].body.contains("/Requests/View/7"));
    }

    #[tokio::test]
    async fn test_approved_skips_requester_who_is_also_peo() {
        let (notifier, mailer, _) = setup();
        let mut request = saved(7, RequestStatus::Approved);
        request.approving_peo = request.requester.clone();

        notifier.notify(NotificationKind::Approved, &request, None).await.unwrap();

        assert_eq!(ids(&mailer.sent()[0].to), vec![manager().id.0]);
    }

    #[tokio::test]
    async fn test_approved_without_managers_or_requester_sends_nothing() {
        let (notifier, mailer, directory) = setup();
        directory.revoke(manager().id, RoleType::Manager);
        let mut request = saved(7, RequestStatus::Approved);
        request.approving_peo = request.requester.clone();

        notifier.notify(NotificationKind::Approved, &request, None).await.unwrap();

        assert_eq!(mailer.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_rejection_and_cancellation_carry_comment() {
        let (notifier, mailer, _) = setup();

        let declined = saved(3, RequestStatus::Declined);
        notifier
            .notify(
                NotificationKind::Rejected { status: RequestStatus::Declined },
                &declined,
                Some("Out of scope"),
            )
            .await
            .unwrap();

        let cancelled = saved(3, RequestStatus::Cancelled);
        notifier
            .notify(NotificationKind::Cancelled, &cancelled, Some("No longer needed"))
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent[0].subject, "Request 0003 Declined");
        assert_eq!(ids(&sent[0].to), vec![requester().id.0]);
        assert!(sent[0].body.contains("Out of scope"));

        assert_eq!(sent[1].subject, "Request 0003 Cancelled");
        assert_eq!(ids(&sent[1].to), vec![requester().id.0, peo().id.0]);
        assert_eq!(ids(&sent[1].cc), vec![manager().id.0]);
        assert!(sent[1].body.contains("No longer needed"));
    }

    #[tokio::test]
    async fn test_status_change_subject() {
        let (notifier, mailer, _) = setup();
        let request = saved(12, RequestStatus::Contract);

        notifier
            .notify(
                NotificationKind::StatusChanged {
                    from: RequestStatus::Accepted,
                    to: RequestStatus::Contract,
                },
                &request,
                None,
            )
            .await
            .unwrap();

        assert_eq!(mailer.sent()[0].subject, "Request 0012 Status Changed to Contract");
    }

    #[tokio::test]
    async fn test_note_added_goes_to_both_parties() {
        let (notifier, mailer, _) = setup();
        let request = saved(4, RequestStatus::Review);
        let note = Note {
            id: NoteId(1),
            request_id: request.id,
            title: "Clarification".to_string(),
            text: "Which org pays?".to_string(),
            author: manager(),
            created_at: request.data.request_date,
        };

        notifier
            .notify(NotificationKind::NoteAdded(note), &request, None)
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent[0].subject, "Note Added for Request 0004");
        assert_eq!(ids(&sent[0].to), vec![peo().id.0, requester().id.0]);
        assert!(sent[0].body.contains("<h4>Clarification</h4>"));
    }

    #[tokio::test]
    async fn test_user_text_is_escaped_in_body() {
        let (notifier, mailer, _) = setup();
        let mut request = saved(4, RequestStatus::Review);
        request.data.title = "Tools & <b>Dashboards</b>".to_string();
        let note = Note {
            id: NoteId(2),
            request_id: request.id,
            title: "<script>alert(1)</script>".to_string(),
            text: "Use \"quotes\" & it's fine".to_string(),
            author: manager(),
            created_at: request.data.request_date,
        };

        notifier
            .notify(NotificationKind::NoteAdded(note), &request, None)
            .await
            .unwrap();
        let cancelled = saved(4, RequestStatus::Cancelled);
        notifier
            .notify(NotificationKind::Cancelled, &cancelled, Some("<img src=x>"))
            .await
            .unwrap();

        let sent = mailer.sent();
        let body = &sent[0].body;
        assert!(!body.contains("<script>"));
        assert!(body.contains("<h4>&lt;script&gt;alert(1)&lt;/script&gt;</h4>"));
        assert!(body.contains("Use &quot;quotes&quot; &amp; it&#39;s fine"));
        assert!(body.contains("Tools &amp; &lt;b&gt;Dashboards&lt;/b&gt;"));
        assert!(sent[1].body.contains("&lt;img src=x&gt;"));
        assert!(sent[1].body.contains(r#"<a href="https://reqtrack.example.com/Requests/View/4">here</a>"#));
    }

    #[tokio::test]
    async fn test_recipients_follow_role_changes_between_calls() {
        let (notifier, mailer, directory) = setup();
        let request = saved(7, RequestStatus::Submitted);
        let newcomer = Person::new(21, "New Manager", "new@example.com");

        notifier.notify(NotificationKind::Submitted, &request, None).await.unwrap();
        directory.revoke(manager().id, RoleType::Manager);
        directory.grant(newcomer.clone(), RoleType::Manager);
        notifier.notify(NotificationKind::Submitted, &request, None).await.unwrap();

        let sent = mailer.sent();
        assert_eq!(ids(&sent[0].cc), vec![manager().id.0]);
        assert_eq!(ids(&sent[1].cc), vec![newcomer.id.0]);
    }

    #[tokio::test]
    async fn test_manager_who_is_recipient_is_not_copied() {
        let (notifier, mailer, directory) = setup();
        directory.grant(requester(), RoleType::Manager);
        let request = saved(7, RequestStatus::Declined);

        notifier
            .notify(
                NotificationKind::Rejected { status: RequestStatus::Declined },
                &request,
                Some("No"),
            )
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(ids(&sent[0].to), vec![requester().id.0]);
        assert_eq!(ids(&sent[0].cc), vec![manager().id.0]);
    }

    #[tokio::test]
    async fn test_mailer_failure_is_reported() {
        let (notifier, mailer, _) = setup();
        mailer.fail_with("relay down");
        let request = saved(7, RequestStatus::Submitted);

        let err = notifier
            .notify(NotificationKind::Submitted, &request, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "notification");
    }
}
