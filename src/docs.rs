use crate::api::attendance::TapRequest;
use crate::api::cards::RegisterCard;
use crate::api::users::UserQuery;
use crate::attendance::TapResponse;
use crate::auth::handlers::LoginResponse;
use crate::model::card::Card;
use crate::model::role::RoleTag;
use crate::model::user::User;
use crate::models::LoginReqDto;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tap Attendance API",
        version = "0.1.0",
        description = r#"
## Card-tap class attendance

Readers post every card tap to a single endpoint. The tap is routed by the
holder's role:

- **Teacher** taps open the class session matching the timetable (within
  20 minutes of the slot start) and close it on the next tap.
- **Student** taps alternate between check-in and check-out. Repeat taps within
  5 minutes are ignored.

Ten minutes after a session closes, every student record of that class is
finalized as **Present**, **Partial** or **Absent**.

### Administration
- Card registration
- User lookup by email
- Credential validation
"#,
    ),
    paths(
        crate::api::attendance::tap,
        crate::api::cards::register_card,
        crate::api::users::find_user,
        crate::auth::handlers::login
    ),
    components(
        schemas(
            TapRequest,
            TapResponse,
            RegisterCard,
            Card,
            UserQuery,
            User,
            RoleTag,
            LoginReqDto,
            LoginResponse
        )
    ),
    tags(
        (name = "Attendance", description = "Card tap processing"),
        (name = "Cards", description = "Card registration"),
        (name = "Users", description = "User lookup"),
        (name = "Auth", description = "Credential validation"),
    )
)]
pub struct ApiDoc;
