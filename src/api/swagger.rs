use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mortgage Sync Service API",
        version = "1.0.0",
        description = "Application-state synchronization engine for multi-step mortgage applications. \n\n**Features:**\n- Draft application lifecycle with a 6-step state machine\n- Person identity resolution (unique by email) and co-applicant reconciliation\n- Idempotent step saves with wholesale replacement of nested collections\n- CRM mirroring (best-effort) with OAuth token lifecycle management\n- Continuation flow gated by single-use verification codes",
        contact(
            name = "Mortgage Sync Team",
            email = "support@mortgage-sync.example"
        )
    ),
    paths(
        // Health
        crate::api::health::health_check,

        // Applications
        crate::api::applications::create_application,
        crate::api::applications::get_application,
        crate::api::applications::save_step,
        crate::api::applications::submit_application,

        // Co-applicants
        crate::api::co_applicants::reconcile_co_applicants,
        crate::api::co_applicants::save_co_applicant_step,

        // Continuation
        crate::api::continuation::request_continuation,
        crate::api::continuation::redeem_code,
    ),
    components(
        schemas(
            // Health
            crate::api::health::HealthResponse,

            // Applications
            crate::services::application_service::StartApplicationResponse,
            crate::services::application_service::CommitStepRequest,
            crate::services::application_service::CommitStepResponse,
            crate::services::application_service::PatchApplicationRequest,
            crate::services::application_service::ApplicationView,
            crate::services::application_service::ParticipantView,
            crate::services::application_service::PersonView,
            crate::api::applications::SubmitRequest,

            // Participants
            crate::services::participant_registry::PersonFields,
            crate::services::participant_sync::AddressFields,
            crate::services::participant_sync::DependentInput,
            crate::services::participant_sync::EmploymentDetailInput,
            crate::services::participant_sync::FinancialCommitmentInput,
            crate::services::participant_sync::RentalPropertyInput,
            crate::api::co_applicants::ReconcileRequest,

            // CRM fan-out
            crate::services::co_applicant_records::CoApplicantRecordsResult,

            // Continuation
            crate::api::continuation::ContinuationRequest,
            crate::api::continuation::RedeemRequest,
            crate::api::continuation::ContinuationResponse,
        )
    ),
    tags(
        (name = "Applications", description = "Draft application lifecycle: create, load, commit steps, final submission."),
        (name = "Co-applicants", description = "Dynamic co-applicant set: reconcile the list, save role-scoped steps."),
        (name = "Continuation", description = "Resume a saved application via a single-use emailed verification code."),
        (name = "Health", description = "Health check endpoint for monitoring service status."),
    )
)]
pub struct ApiDoc;
