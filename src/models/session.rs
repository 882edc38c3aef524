use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    config::Config,
    error::{AppError, Result},
    models::notification::{Subject, SubjectType},
};

/// 当前会话
///
/// 所有需要主体身份的地方都通过 [`Session::subject`] 访问，
/// 未登录时返回认证错误，由调用方跳转到登录入口。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Session {
    Authenticated(Subject),
    Anonymous,
}

impl Session {
    pub fn from_config(config: &Config) -> Self {
        let Some(raw_id) = config.session_subject_id.as_deref() else {
            return Session::Anonymous;
        };

        let id = match raw_id.trim().parse::<i64>() {
            Ok(id) if id > 0 => id,
            _ => {
                warn!("Ignoring invalid session subject id: {:?}", raw_id);
                return Session::Anonymous;
            }
        };

        match config.session_subject_type.parse::<SubjectType>() {
            Ok(subject_type) => Session::Authenticated(Subject::new(id, subject_type)),
            Err(e) => {
                warn!("Ignoring session with invalid subject type: {}", e);
                Session::Anonymous
            }
        }
    }

    pub fn subject(&self) -> Result<&Subject> {
        match self {
            Session::Authenticated(subject) => Ok(subject),
            Session::Anonymous => Err(AppError::unauthorized(
                "No active session; sign in before starting notification sync",
            )),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }
}
