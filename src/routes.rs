use actix_web::web::{delete, get, post, put, resource, scope, ServiceConfig};

use crate::core::ports::{completer::Completer, repository::Store, uploader::Uploader};
use crate::handlers;

/// Mounts every endpoint. Expects `Data` for the store `S`, the uploader `U`,
/// an `Option<C>` completer, `Resilience`, `JWT` and the poll feed.
pub fn configure<S, U, C>(cfg: &mut ServiceConfig)
where
    S: Store + 'static,
    U: Uploader + 'static,
    C: Completer + 'static,
{
    cfg.service(resource("signup").route(post().to(handlers::signup::<S>)))
        .service(resource("login").route(post().to(handlers::login::<S>)))
        .service(resource("logout").route(post().to(handlers::logout)))
        .service(resource("feed").route(get().to(handlers::poll::feed::<S>)))
        .service(resource("upload").route(post().to(handlers::upload::create::<U>)))
        .service(resource("content").route(post().to(handlers::content::generate::<C>)))
        .service(resource("users").route(get().to(handlers::profile::search::<S>)))
        .service(resource("profile").route(put().to(handlers::profile::update::<S>)))
        .service(resource("profiles/{profile_id}").route(get().to(handlers::profile::detail::<S>)))
        .service(
            scope("polls")
                .route("", get().to(handlers::poll::list::<S>))
                .route("", post().to(handlers::poll::create::<S>))
                .route("public", get().to(handlers::poll::public::<S>))
                .route("search", get().to(handlers::poll::search::<S>))
                .route("mine", get().to(handlers::poll::mine::<S>))
                .service(
                    scope("{poll_id}")
                        .route("", get().to(handlers::poll::detail::<S>))
                        .route("votes", post().to(handlers::poll::vote::<S>))
                        .route("visibility", put().to(handlers::poll::toggle_visibility::<S>))
                        .route("access", get().to(handlers::poll::check_access::<S>))
                        .service(
                            scope("users")
                                .route("", get().to(handlers::access::users::<S>))
                                .route("", post().to(handlers::access::grant::<S>))
                                .route("{user_id}", delete().to(handlers::access::revoke::<S>)),
                        ),
                ),
        );
}
