use crate::api::{
    attendance, candidate, dashboard, department, employee, leave_request, mail, notification,
    payroll, project, task, upload,
};
use crate::auth::{claims, handlers};
use crate::media::UploadedAsset;
use crate::model::{
    attendance::{AttendanceRecord, AttendanceStatus, AttendanceSummary},
    candidate::{Candidate, Stage},
    department::{Department, DepartmentMember},
    employee::{Employee, EmployeeDocument, EmployeeStatus},
    leave_request::{LeaveRequest, LeaveStatus, LeaveType},
    mail::{Mail, MailStatus},
    notification::Notification,
    payroll::{Payroll, PayrollPeriod, PeriodStatus},
    project::{Project, ProjectMember, ProjectStatus},
    task::{ResponseKind, ReviewStatus, Task, TaskPriority, TaskResponse, TaskStatus},
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Portal API",
        version = "1.0.0",
        description = r#"
## Human Resource Management (HRM) Portal

Backend for an HR portal: people, organization structure, work tracking and internal communication.

### 🔹 Key Features
- **Employees and departments**
  - Profiles, documents, department membership grouped by role
- **Projects and tasks**
  - Budgets, members, task assignment and reviewed task responses
- **Attendance and leave**
  - Daily punch in/out with late detection, leave requests with approval
- **Payroll**
  - Monthly payroll records, reports and payroll periods
- **Recruitment**
  - Candidate pipeline with guarded stage transitions
- **Mail and notifications**
  - Internal mailbox with threads, external delivery over SMTP
- **Media uploads**
  - Single and batch uploads to the media CDN

### 🔐 Security
Everything under `/api` needs a **JWT Bearer** access token from `/auth/login`.
Sensitive operations are limited to the **HR** and **Admin** roles.

### 📦 Response Format
- `{ "success": true, "data": ... }` on success
- `{ "success": false, "message": ... }` on failure
- List endpoints add `page`, `per_page` and `total`
"#,
    ),
    paths(
        handlers::register,
        handlers::login,
        handlers::refresh_token,
        handlers::logout,
        handlers::link_employee,

        employee::create_employee,
        employee::list_employees,
        employee::get_employee,
        employee::update_employee,
        employee::delete_employee,
        employee::list_documents,
        employee::add_document,
        employee::delete_document,
        employee::attendance_summary,

        department::list_departments,
        department::get_department,
        department::create_department,
        department::update_department,
        department::delete_department,
        department::department_members,

        project::list_projects,
        project::get_project,
        project::create_project,
        project::update_project,
        project::delete_project,
        project::replace_members,

        task::list_tasks,
        task::get_task,
        task::create_task,
        task::update_task_status,
        task::delete_task,
        task::create_response,
        task::list_responses,
        task::review_response,

        attendance::punch_in,
        attendance::punch_out,
        attendance::my_attendance,
        attendance::my_summary,
        attendance::record_absences,

        payroll::create_payroll,
        payroll::update_payroll,
        payroll::get_payroll,
        payroll::list_payrolls,
        payroll::payroll_report,
        payroll::list_periods,
        payroll::create_period,
        payroll::activate_period,
        payroll::close_period,

        leave_request::list_leaves,
        leave_request::get_leave,
        leave_request::create_leave,
        leave_request::approve_leave,
        leave_request::reject_leave,

        candidate::list_candidates,
        candidate::get_candidate,
        candidate::create_candidate,
        candidate::update_candidate,
        candidate::delete_candidate,
        candidate::move_stage,

        mail::inbox,
        mail::outbox,
        mail::get_mail,
        mail::send_mail,
        mail::toggle_star,
        mail::toggle_read,
        mail::delete_mail,
        mail::thread,

        notification::list_notifications,
        notification::mark_read,
        notification::mark_all_read,

        upload::upload_single,
        upload::upload_multiple,
        upload::delete_upload,

        dashboard::my_dashboard,
        dashboard::admin_dashboard
    ),
    components(
        schemas(
            claims::RegisterReq,
            claims::LoginReq,
            claims::TokenPair,
            claims::LinkEmployee,
            Employee,
            EmployeeStatus,
            EmployeeDocument,
            employee::CreateEmployee,
            employee::AttachDocument,
            Department,
            DepartmentMember,
            department::CreateDepartment,
            Project,
            ProjectStatus,
            ProjectMember,
            project::CreateProject,
            project::ReplaceMembers,
            project::ProjectDetail,
            Task,
            TaskPriority,
            TaskStatus,
            TaskResponse,
            ResponseKind,
            ReviewStatus,
            task::CreateTask,
            task::UpdateTaskStatus,
            task::CreateTaskResponse,
            task::ReviewResponse,
            AttendanceRecord,
            AttendanceStatus,
            AttendanceSummary,
            Payroll,
            PayrollPeriod,
            PeriodStatus,
            payroll::CreatePayroll,
            payroll::UpdatePayroll,
            payroll::CreatePeriod,
            payroll::PayrollReport,
            LeaveRequest,
            LeaveStatus,
            LeaveType,
            leave_request::CreateLeave,
            Candidate,
            Stage,
            candidate::CreateCandidate,
            candidate::MoveStage,
            Mail,
            MailStatus,
            mail::SendMail,
            Notification,
            UploadedAsset,
            upload::DeleteUpload,
            dashboard::MyDashboard,
            dashboard::AdminDashboard,
            dashboard::Headcount,
            dashboard::DepartmentHeadcount
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Registration, login, token refresh and account linking"),
        (name = "Employee", description = "Employee profiles and documents"),
        (name = "Department", description = "Departments and their members"),
        (name = "Project", description = "Projects, budgets and members"),
        (name = "Task", description = "Task assignment and task responses"),
        (name = "Attendance", description = "Daily punch in/out and summaries"),
        (name = "Payroll", description = "Payroll records and periods"),
        (name = "Leave", description = "Leave requests and approvals"),
        (name = "Recruitment", description = "Candidate pipeline"),
        (name = "Mail", description = "Internal and external mail"),
        (name = "Notification", description = "In-app notifications"),
        (name = "Upload", description = "Media uploads"),
        (name = "Dashboard", description = "Aggregated views"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();

        let components = doc.components.as_ref().unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));

        for path in [
            "/api/employees/{employee_id}/documents",
            "/api/payroll/report",
            "/api/mail/{mail_id}/thread",
            "/api/upload/multiple",
            "/api/dashboard/admin",
            "/auth/login",
            "/api/users/{user_id}/employee",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
