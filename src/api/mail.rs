use crate::{
    api::{done, notification::notify, ok},
    auth::user::AuthUser,
    error::{AppError, AppResult},
    mailer::{MailTransport, MailerHandle, OutgoingMail},
    model::mail::{DeleteOutcome, MAX_THREAD_DEPTH, Mail, MailStatus, Side, conversation},
    utils::{
        pagination::{PageWindow, Paginated},
        validation::{is_valid_email, require_non_empty},
    },
};
use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::MySqlPool;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

const MAIL_COLUMNS: &str = "id, sender_id, recipient_id, recipient_email, subject, body, \
     status, is_read, parent_id, created_at, starred_by_sender, starred_by_recipient, \
     deleted_by_sender, deleted_by_recipient";

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMail {
    /// Employee mailbox; takes precedence over `to`
    #[schema(example = 7)]
    pub recipient_id: Option<u64>,
    /// Any address; matched against employee emails first
    #[schema(example = "jane.roe@company.com")]
    pub to: Option<String>,
    #[schema(example = "Quarterly review")]
    pub subject: String,
    pub body: String,
    /// Mail this one replies to
    pub parent_id: Option<u64>,
}

#[derive(Debug, PartialEq)]
pub enum Recipient {
    Employee(u64),
    Address(String),
}

impl SendMail {
    /// Checks the payload and picks the recipient it names
    pub fn recipient(&self) -> AppResult<Recipient> {
        require_non_empty("subject", &self.subject)?;
        require_non_empty("body", &self.body)?;

        if let Some(id) = self.recipient_id {
            return Ok(Recipient::Employee(id));
        }

        match self.to.as_deref().map(str::trim) {
            Some(addr) if is_valid_email(addr) => Ok(Recipient::Address(addr.to_string())),
            Some(_) => Err(AppError::bad_request("to must be a valid email address")),
            None => Err(AppError::bad_request("A recipient_id or to address is required")),
        }
    }
}

#[derive(Deserialize, IntoParams)]
pub struct MailboxQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    /// Only starred mail
    pub starred: Option<bool>,
}

/// Hands an external mail to the transport; no transport means it cannot leave
pub async fn deliver_external(
    transport: Option<&dyn MailTransport>,
    mail: OutgoingMail,
) -> MailStatus {
    let Some(transport) = transport else {
        warn!(to = %mail.to, "SMTP not configured, external mail not delivered");
        return MailStatus::Failed;
    };

    match transport.send(mail).await {
        Ok(()) => MailStatus::Sent,
        Err(e) => {
            warn!(error = %e, "External mail delivery failed");
            MailStatus::Failed
        }
    }
}

async fn fetch_visible(pool: &MySqlPool, mail_id: u64, employee_id: u64) -> AppResult<Mail> {
    sqlx::query_as::<_, Mail>(&format!(
        r#"
        SELECT {MAIL_COLUMNS} FROM mails
        WHERE id = ?
          AND ((sender_id = ? AND deleted_by_sender = FALSE)
            OR (recipient_id = ? AND deleted_by_recipient = FALSE))
        "#
    ))
    .bind(mail_id)
    .bind(employee_id)
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .map(|mail| mail.viewed_by(employee_id))
    .ok_or_else(|| AppError::not_found("Mail not found"))
}

async fn mailbox(
    pool: &MySqlPool,
    side: Side,
    employee_id: u64,
    query: &MailboxQuery,
) -> AppResult<HttpResponse> {
    let window = PageWindow::new(query.page, query.per_page, 20);
    let filter = side.mailbox_filter();
    let starred = if query.starred.unwrap_or(false) {
        format!(" AND {} = TRUE", side.star_column())
    } else {
        String::new()
    };

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM mails WHERE {filter}{starred}"
    ))
    .bind(employee_id)
    .fetch_one(pool)
    .await?;

    let data = sqlx::query_as::<_, Mail>(&format!(
        "SELECT {MAIL_COLUMNS} FROM mails WHERE {filter}{starred} \
         ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
    ))
    .bind(employee_id)
    .bind(window.limit())
    .bind(window.offset())
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|mail| mail.viewed_by(employee_id))
    .collect::<Vec<_>>();

    Ok(HttpResponse::Ok().json(Paginated::new(data, window, total)))
}

#[utoipa::path(
    get,
    path = "/api/mail/inbox",
    params(MailboxQuery),
    responses((status = 200, description = "Received mail, newest first", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Mail"
)]
pub async fn inbox(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MailboxQuery>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    mailbox(pool.get_ref(), Side::Recipient, employee_id, &query).await
}

#[utoipa::path(
    get,
    path = "/api/mail/outbox",
    params(MailboxQuery),
    responses((status = 200, description = "Sent mail, newest first", body = Object)),
    security(("bearer_auth" = [])),
    tag = "Mail"
)]
pub async fn outbox(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MailboxQuery>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    mailbox(pool.get_ref(), Side::Sender, employee_id, &query).await
}

/// Opening a received mail marks it read
#[utoipa::path(
    get,
    path = "/api/mail/{mail_id}",
    params(("mail_id" = u64, Path, description = "Mail ID")),
    responses(
        (status = 200, description = "Mail found", body = Mail),
        (status = 404, description = "Mail not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Mail"
)]
pub async fn get_mail(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let mut mail = fetch_visible(pool.get_ref(), path.into_inner(), employee_id).await?;

    if mail.recipient_id == Some(employee_id) && !mail.is_read {
        sqlx::query("UPDATE mails SET is_read = TRUE WHERE id = ?")
            .bind(mail.id)
            .execute(pool.get_ref())
            .await?;
        mail.is_read = true;
    }

    Ok(ok(mail))
}

async fn insert_mail<'e, E>(
    executor: E,
    sender_id: u64,
    recipient_id: Option<u64>,
    recipient_email: &str,
    payload: &SendMail,
    status: MailStatus,
) -> AppResult<u64>
where
    E: sqlx::Executor<'e, Database = sqlx::MySql>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO mails (sender_id, recipient_id, recipient_email, subject, body, status, parent_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(sender_id)
    .bind(recipient_id)
    .bind(recipient_email)
    .bind(payload.subject.trim())
    .bind(&payload.body)
    .bind(status.as_ref())
    .bind(payload.parent_id)
    .execute(executor)
    .await?;

    Ok(result.last_insert_id())
}

#[utoipa::path(
    post,
    path = "/api/mail",
    request_body = SendMail,
    responses(
        (status = 201, description = "Mail stored; status tells whether it was delivered", body = Object, example = json!({
            "success": true,
            "message": "Mail sent",
            "data": { "id": 31, "status": "sent" }
        })),
        (status = 400, description = "Missing recipient, subject or body"),
        (status = 404, description = "Recipient or parent mail not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Mail"
)]
pub async fn send_mail(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    mailer: web::Data<MailerHandle>,
    payload: web::Json<SendMail>,
) -> AppResult<HttpResponse> {
    let sender_id = auth.employee()?;
    let recipient = payload.recipient()?;

    if let Some(parent_id) = payload.parent_id {
        fetch_visible(pool.get_ref(), parent_id, sender_id).await?;
    }

    // an address that belongs to an employee stays inside the organization
    let (recipient_id, recipient_email) = match recipient {
        Recipient::Employee(id) => {
            let email = sqlx::query_scalar::<_, String>("SELECT email FROM employees WHERE id = ?")
                .bind(id)
                .fetch_optional(pool.get_ref())
                .await?
                .ok_or_else(|| AppError::not_found("Recipient not found"))?;
            (Some(id), email)
        }
        Recipient::Address(address) => {
            let id = sqlx::query_scalar::<_, u64>("SELECT id FROM employees WHERE email = ?")
                .bind(&address)
                .fetch_optional(pool.get_ref())
                .await?;
            (id, address)
        }
    };

    let subject = payload.subject.trim();

    let (mail_id, status) = match recipient_id {
        // the mail and its notification land together or not at all
        Some(employee_id) => {
            let mut tx = pool.begin().await?;
            let mail_id = insert_mail(
                &mut *tx,
                sender_id,
                Some(employee_id),
                &recipient_email,
                &payload,
                MailStatus::Sent,
            )
            .await?;
            notify(
                &mut *tx,
                employee_id,
                "New mail",
                subject,
                Some(format!("/mail/{mail_id}").as_str()),
            )
            .await?;
            tx.commit().await?;
            (mail_id, MailStatus::Sent)
        }
        // stored as pending first so a crash mid-delivery leaves a trace
        None => {
            let mail_id = insert_mail(
                pool.get_ref(),
                sender_id,
                None,
                &recipient_email,
                &payload,
                MailStatus::Pending,
            )
            .await?;

            let from_name = sqlx::query_scalar::<_, String>(
                "SELECT CONCAT(first_name, ' ', last_name) FROM employees WHERE id = ?",
            )
            .bind(sender_id)
            .fetch_optional(pool.get_ref())
            .await?
            .unwrap_or_default();

            let outgoing = OutgoingMail {
                from_name,
                to: recipient_email.clone(),
                subject: subject.to_string(),
                body: payload.body.clone(),
            };
            let status = deliver_external(mailer.transport(), outgoing).await;

            sqlx::query("UPDATE mails SET status = ? WHERE id = ? AND status = ?")
                .bind(status.as_ref())
                .bind(mail_id)
                .bind(MailStatus::Pending.as_ref())
                .execute(pool.get_ref())
                .await?;
            (mail_id, status)
        }
    };

    info!(mail_id, sender_id, internal = recipient_id.is_some(), status = %status, "Mail processed");

    let message = match status {
        MailStatus::Failed => "Mail saved but could not be delivered",
        _ => "Mail sent",
    };

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": message,
        "data": { "id": mail_id, "status": status }
    })))
}

#[utoipa::path(
    put,
    path = "/api/mail/{mail_id}/star",
    params(("mail_id" = u64, Path, description = "Mail ID")),
    responses(
        (status = 200, description = "Caller's own star toggled", body = Object, example = json!({
            "success": true,
            "data": { "is_starred": true }
        })),
        (status = 404, description = "Mail not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Mail"
)]
pub async fn toggle_star(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let mail = fetch_visible(pool.get_ref(), path.into_inner(), employee_id).await?;

    // only the caller's own star changes
    let starred = !mail.is_starred;
    for side in mail.sides(employee_id) {
        sqlx::query(&format!("UPDATE mails SET {} = ? WHERE id = ?", side.star_column()))
            .bind(starred)
            .bind(mail.id)
            .execute(pool.get_ref())
            .await?;
    }

    Ok(ok(json!({ "is_starred": starred })))
}

#[utoipa::path(
    put,
    path = "/api/mail/{mail_id}/read",
    params(("mail_id" = u64, Path, description = "Mail ID")),
    responses(
        (status = 200, description = "Read flag toggled", body = Object, example = json!({
            "success": true,
            "data": { "is_read": false }
        })),
        (status = 404, description = "Mail not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Mail"
)]
pub async fn toggle_read(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let mail = fetch_visible(pool.get_ref(), path.into_inner(), employee_id).await?;

    if mail.recipient_id != Some(employee_id) {
        return Err(AppError::Forbidden("Only the recipient can change the read flag".into()));
    }

    let read = !mail.is_read;
    sqlx::query("UPDATE mails SET is_read = ? WHERE id = ?")
        .bind(read)
        .bind(mail.id)
        .execute(pool.get_ref())
        .await?;

    Ok(ok(json!({ "is_read": read })))
}

#[utoipa::path(
    delete,
    path = "/api/mail/{mail_id}",
    params(("mail_id" = u64, Path, description = "Mail ID")),
    responses(
        (status = 200, description = "Mail removed from the caller's mailbox"),
        (status = 404, description = "Mail not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Mail"
)]
pub async fn delete_mail(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let mail_id = path.into_inner();

    let mut tx = pool.begin().await?;

    // the other side may be deleting at the same moment
    let mail = sqlx::query_as::<_, Mail>(&format!(
        "SELECT {MAIL_COLUMNS} FROM mails WHERE id = ? FOR UPDATE"
    ))
    .bind(mail_id)
    .fetch_optional(&mut *tx)
    .await?
    .filter(|mail| mail.visible_to(employee_id))
    .ok_or_else(|| AppError::not_found("Mail not found"))?;

    match mail.after_delete_by(employee_id) {
        DeleteOutcome::Remove => {
            sqlx::query("DELETE FROM mails WHERE id = ?")
                .bind(mail.id)
                .execute(&mut *tx)
                .await?;
            debug!(mail_id, "Mail removed from both mailboxes");
        }
        DeleteOutcome::Hide {
            deleted_by_sender,
            deleted_by_recipient,
        } => {
            sqlx::query(
                "UPDATE mails SET deleted_by_sender = ?, deleted_by_recipient = ? WHERE id = ?",
            )
            .bind(deleted_by_sender)
            .bind(deleted_by_recipient)
            .bind(mail.id)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    Ok(done("Mail deleted"))
}

/// Parent links of every mail around `start`: its ancestors, then replies
/// to the topmost one level by level
async fn load_thread_links(pool: &MySqlPool, start: &Mail) -> AppResult<HashMap<u64, Option<u64>>> {
    let mut links = HashMap::from([(start.id, start.parent_id)]);

    let mut top = start.id;
    let mut parent = start.parent_id;
    for _ in 0..MAX_THREAD_DEPTH {
        let Some(id) = parent.filter(|id| !links.contains_key(id)) else {
            break;
        };
        let Some(next) = sqlx::query_scalar::<_, Option<u64>>("SELECT parent_id FROM mails WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
        else {
            break;
        };
        links.insert(id, next);
        top = id;
        parent = next;
    }

    let mut expanded = HashSet::from([top]);
    let mut frontier = vec![top];
    for _ in 0..MAX_THREAD_DEPTH {
        if frontier.is_empty() {
            break;
        }
        let placeholders = vec!["?"; frontier.len()].join(", ");
        let sql = format!("SELECT id, parent_id FROM mails WHERE parent_id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (u64, Option<u64>)>(&sql);
        for id in &frontier {
            query = query.bind(*id);
        }

        let mut next = Vec::new();
        for (id, parent_id) in query.fetch_all(pool).await? {
            links.insert(id, parent_id);
            if expanded.insert(id) {
                next.push(id);
            }
        }
        frontier = next;
    }

    Ok(links)
}

/// Whole conversation the mail belongs to, oldest first
#[utoipa::path(
    get,
    path = "/api/mail/{mail_id}/thread",
    params(("mail_id" = u64, Path, description = "Any mail in the thread")),
    responses(
        (status = 200, description = "Thread visible to the caller", body = [Mail]),
        (status = 404, description = "Mail not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Mail"
)]
pub async fn thread(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    let employee_id = auth.employee()?;
    let start = fetch_visible(pool.get_ref(), path.into_inner(), employee_id).await?;

    let links = load_thread_links(pool.get_ref(), &start).await?;
    let ids = conversation(start.id, &links);

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        r#"
        SELECT {MAIL_COLUMNS} FROM mails
        WHERE id IN ({placeholders})
          AND ((sender_id = ? AND deleted_by_sender = FALSE)
            OR (recipient_id = ? AND deleted_by_recipient = FALSE))
        ORDER BY created_at ASC, id ASC
        "#
    );
    let mut query = sqlx::query_as::<_, Mail>(&sql);
    for id in &ids {
        query = query.bind(*id);
    }
    let mails = query
        .bind(employee_id)
        .bind(employee_id)
        .fetch_all(pool.get_ref())
        .await?
        .into_iter()
        .map(|mail| mail.viewed_by(employee_id))
        .collect::<Vec<_>>();

    Ok(ok(mails))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::fake::RecordingMailer;

    fn payload(recipient_id: Option<u64>, to: Option<&str>) -> SendMail {
        SendMail {
            recipient_id,
            to: to.map(str::to_string),
            subject: "Hello".into(),
            body: "Body".into(),
            parent_id: None,
        }
    }

    fn outgoing(to: &str) -> OutgoingMail {
        OutgoingMail {
            from_name: "Jane Roe".into(),
            to: to.into(),
            subject: "Offer".into(),
            body: "Welcome aboard".into(),
        }
    }

    #[test]
    fn recipient_is_required() {
        assert!(payload(None, None).recipient().is_err());
        assert!(payload(None, Some("not-an-address")).recipient().is_err());
        assert_eq!(payload(Some(4), None).recipient().unwrap(), Recipient::Employee(4));
        assert_eq!(
            payload(Some(4), Some("x@y.io")).recipient().unwrap(),
            Recipient::Employee(4)
        );
        assert_eq!(
            payload(None, Some(" ext@partner.io ")).recipient().unwrap(),
            Recipient::Address("ext@partner.io".into())
        );
    }

    #[test]
    fn subject_and_body_are_required() {
        let mut p = payload(Some(1), None);
        p.subject = "  ".into();
        assert!(p.recipient().is_err());

        let mut p = payload(Some(1), None);
        p.body = String::new();
        assert!(p.recipient().is_err());
    }

    #[actix_web::test]
    async fn external_mail_goes_through_transport() {
        let transport = RecordingMailer::default();

        let status =
            deliver_external(Some(&transport as &dyn MailTransport), outgoing("ext@partner.io")).await;

        assert_eq!(status, MailStatus::Sent);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ext@partner.io");
    }

    #[actix_web::test]
    async fn transport_errors_mark_mail_failed() {
        let transport = RecordingMailer::default();

        let status =
            deliver_external(Some(&transport as &dyn MailTransport), outgoing("broken address")).await;

        assert_eq!(status, MailStatus::Failed);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn without_smtp_external_mail_fails() {
        let status = deliver_external(None, outgoing("ext@partner.io")).await;
        assert_eq!(status, MailStatus::Failed);
    }
}
