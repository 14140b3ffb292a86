use warden_core::{CalendarStamp, InvocationContext};

/// Stored in place of a literal single quote in audit string fields.
pub const AUDIT_QUOTE_ESCAPE_TOKEN: &str = "[single_quote]";

/// Replaces literal single quotes with [`AUDIT_QUOTE_ESCAPE_TOKEN`]; every other
/// character is kept as-is.
pub fn sanitize_audit_field(raw: &str) -> String {
    raw.replace('\'', AUDIT_QUOTE_ESCAPE_TOKEN)
}

/// One `CommandStats` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub epoch_time: i64,
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub channel_name: String,
    pub command: String,
    pub invoked_with: String,
    pub invoked_subcommand: Option<String>,
}

impl AuditRecord {
    pub fn from_invocation(ctx: &InvocationContext, stamp: CalendarStamp) -> Self {
        Self {
            epoch_time: stamp.epoch_time,
            year: stamp.year,
            month: stamp.month,
            day: stamp.day,
            hour: stamp.hour,
            channel_name: sanitize_audit_field(&ctx.channel_name),
            command: sanitize_audit_field(&ctx.command_name),
            invoked_with: sanitize_audit_field(&ctx.invoked_with),
            invoked_subcommand: ctx
                .invoked_subcommand
                .as_deref()
                .map(sanitize_audit_field),
        }
    }
}
