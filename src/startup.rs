use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AuthService;
use crate::middleware::BearerAuth;
use crate::routes::{get_current_user, health_check, logout, token};

pub fn run(listener: TcpListener, auth: AuthService) -> Result<Server, std::io::Error> {
    let auth_data = web::Data::new(auth.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())

            // Shared state
            .app_data(auth_data.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/token", web::post().to(token))

            // Protected routes (require a bearer token)
            .service(
                web::scope("/api")
                    .wrap(BearerAuth::new(auth.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/logout", web::post().to(logout)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
