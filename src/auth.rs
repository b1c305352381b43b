use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;
use ulid::Ulid;

/// Shared-password source; who the caller is comes from the login name.
#[derive(Debug)]
pub struct AgentcalAuthSource {
    password: String,
}

impl AgentcalAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for AgentcalAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Agent,
    Client,
}

/// The authenticated principal behind a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub role: Role,
    /// Agent or client id; `None` for admins.
    pub id: Option<Ulid>,
}

impl Caller {
    pub fn admin() -> Self {
        Self { role: Role::Admin, id: None }
    }

    pub fn agent(id: Ulid) -> Self {
        Self { role: Role::Agent, id: Some(id) }
    }

    pub fn client(id: Ulid) -> Self {
        Self { role: Role::Client, id: Some(id) }
    }

    /// `agent_<ulid>`, `client_<ulid>`, or the service user (admin).
    pub fn from_login(user: &str, service_user: &str) -> Option<Self> {
        if user == service_user {
            return Some(Self::admin());
        }
        if let Some(id) = user.strip_prefix("agent_") {
            return Ulid::from_string(id).ok().map(Self::agent);
        }
        if let Some(id) = user.strip_prefix("client_") {
            return Ulid::from_string(id).ok().map(Self::client);
        }
        None
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_agent(&self, agent_id: Ulid) -> bool {
        self.role == Role::Agent && self.id == Some(agent_id)
    }

    pub fn is_client(&self, client_id: Ulid) -> bool {
        self.role == Role::Client && self.id == Some(client_id)
    }

    /// Profile, availability toggle, weekly hours.
    pub fn can_manage_agent(&self, agent_id: Ulid) -> bool {
        self.is_admin() || self.is_agent(agent_id)
    }

    pub fn can_book(&self, agent_id: Ulid, client_id: Ulid) -> bool {
        self.is_admin() || self.is_client(client_id) || self.is_agent(agent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_names_map_to_roles() {
        let id = Ulid::new();
        assert_eq!(Caller::from_login("agentcal", "agentcal"), Some(Caller::admin()));
        assert_eq!(Caller::from_login(&format!("agent_{id}"), "agentcal"), Some(Caller::agent(id)));
        assert_eq!(Caller::from_login(&format!("client_{id}"), "agentcal"), Some(Caller::client(id)));
        assert_eq!(Caller::from_login("agent_nope", "agentcal"), None);
        assert_eq!(Caller::from_login("postgres", "agentcal"), None);
    }

    #[test]
    fn ownership_checks() {
        let agent = Ulid::new();
        let client = Ulid::new();
        assert!(Caller::agent(agent).can_manage_agent(agent));
        assert!(!Caller::agent(Ulid::new()).can_manage_agent(agent));
        assert!(!Caller::client(client).can_manage_agent(agent));
        assert!(Caller::client(client).can_book(agent, client));
        assert!(!Caller::client(Ulid::new()).can_book(agent, client));
        assert!(Caller::admin().can_book(agent, client));
    }
}
