//! UseCase layer: one use case per protocol operation.

pub mod connect_group;
pub mod disconnect_user;
pub mod error;
pub mod login_user;
pub mod register_user;
pub mod send_message;

#[cfg(test)]
pub(crate) mod test_support;

pub use connect_group::{ConnectGroupUseCase, JoinSnapshot};
pub use disconnect_user::DisconnectUserUseCase;
pub use error::{ConnectGroupError, LoginError, RegisterError, SendMessageError};
pub use login_user::LoginUserUseCase;
pub use register_user::RegisterUserUseCase;
pub use send_message::SendMessageUseCase;
