use uuid::Uuid;

const SHORT_ID_LEN: usize = 7;

/// Identity of one client session. The id is fixed for the client's
/// lifetime; `seq` counts rounds.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    seq: u64,
    app: Option<String>,
}

impl Session {
    pub fn new(app: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            seq: 0,
            app,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tail of the id, used to tag log lines.
    pub fn short_id(&self) -> &str {
        let start = self.id.len().saturating_sub(SHORT_ID_LEN);
        &self.id[start..]
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// Advances the round counter and returns the new value.
    pub fn next_round(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_uuids() {
        let first = Session::new(None);
        let second = Session::new(Some("demo".into()));

        assert_ne!(first.id(), second.id());
        assert!(Uuid::parse_str(first.id()).is_ok());
        assert_eq!(second.app(), Some("demo"));
    }

    #[test]
    fn short_id_is_the_id_tail() {
        let session = Session::new(None);
        assert_eq!(session.short_id().len(), 7);
        assert!(session.id().ends_with(session.short_id()));
    }

    #[test]
    fn rounds_increment_seq() {
        let mut session = Session::new(None);
        assert_eq!(session.seq(), 0);
        assert_eq!(session.next_round(), 1);
        assert_eq!(session.next_round(), 2);
    }
}
