use serde::{Deserialize, Serialize};

use crate::ids::{SlipId, SlipLinkId};
use crate::roster::{Guardian, Student};
use crate::trips::FieldTrip;

use super::domain::PermissionSlip;
use super::link::PermissionSlipLink;
use super::SlipSettings;

/// A rendered message ready for an external mailer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub slip: SlipId,
    pub link: SlipLinkId,
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

/// Renders the invitation for one link. `guardian` is the link's guardian, or
/// `None` for the student's own link.
pub fn render_email(
    settings: &SlipSettings,
    trip: &FieldTrip,
    slip: &PermissionSlip,
    student: &Student,
    link: &PermissionSlipLink,
    guardian: Option<&Guardian>,
) -> OutboundEmail {
    let details = &trip.details;
    let url = settings.slip_url(&link.link_id);
    let due_date = slip.effective_due_date(trip);
    let student_name = student.person.full_name();

    let (subject, body, to) = match guardian {
        Some(guardian) => (
            format!("New Permission Slip for {student_name}"),
            format!(
                "{},\n\n\
                 There is a new permission slip for you to fill out for your student, {}.\n\n\
                 Trip: {}\n\
                 Location: {}\n\
                 Date: {}\n\
                 Permission Slip Link (click): {}\n\n\
                 Please visit the above link to view and fill out the permission slip by the due date, {}.\n\n\
                 Thank you for your time,\n\n\
                 -- \n{}",
                guardian.person.full_name(),
                student_name,
                details.name,
                details.location,
                details.start_date,
                url,
                due_date,
                settings.signature,
            ),
            guardian.person.email.clone(),
        ),
        None => (
            format!("New Permission Slip for {}", details.name),
            format!(
                "{},\n\n\
                 There is a new permission slip for you to fill out:\n\n\
                 Trip: {}\n\
                 Location: {}\n\
                 Date: {}\n\
                 Permission Slip Link (click): {}\n\n\
                 Please visit the above link to view and fill out the permission slip by the due date, {}.\n\n\
                 Thank you for your time,\n\n\
                 -- \n{}",
                student_name,
                details.name,
                details.location,
                details.start_date,
                url,
                due_date,
                settings.signature,
            ),
            student.person.email.clone(),
        ),
    };

    OutboundEmail {
        slip: slip.id,
        link: link.id,
        subject,
        body,
        from: settings.from_address.clone(),
        to: vec![to],
    }
}
