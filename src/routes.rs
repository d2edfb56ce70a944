use crate::{
    api::{attendance, cards, users},
    auth::handlers,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;
use std::sync::Arc;

/// Per-route limiter allowing `requests_per_min` per peer IP, bursting up to
/// the same amount.
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);

    // finish() only fails on a zero period or burst, both excluded above
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let tap_limiter = Arc::new(build_limiter(config.rate_tap_per_min));
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let admin_limiter = Arc::new(build_limiter(config.rate_admin_per_min));

    cfg.service(
        web::scope("/auth").service(
            web::resource("/login")
                .wrap(login_limiter)
                .route(web::post().to(handlers::login)),
        ),
    );

    cfg.service(
        web::scope(&config.api_prefix)
            // /attendance/tap
            .service(
                web::resource("/attendance/tap")
                    .wrap(tap_limiter)
                    .route(web::post().to(attendance::tap)),
            )
            // /cards
            .service(
                web::resource("/cards")
                    .wrap(admin_limiter.clone())
                    .route(web::post().to(cards::register_card)),
            )
            // /users?email=
            .service(
                web::resource("/users")
                    .wrap(admin_limiter)
                    .route(web::get().to(users::find_user)),
            ),
    );
}
