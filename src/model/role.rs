#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Admin = 1,
    Hr = 2,
    Employee = 3,
    System = 4,
    ApiUser = 5,
    Manager = 6,
}

impl Role {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Role::Admin),
            2 => Some(Role::Hr),
            3 => Some(Role::Employee),
            4 => Some(Role::System),
            5 => Some(Role::ApiUser),
            6 => Some(Role::Manager),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Admin, HR and managers can see and act on other people's records
    pub fn is_manager_or_above(self) -> bool {
        matches!(self, Role::Admin | Role::Hr | Role::Manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for id in 1..=6 {
            let role = Role::from_id(id).unwrap();
            assert_eq!(role.id(), id);
        }
        assert_eq!(Role::from_id(0), None);
        assert_eq!(Role::from_id(7), None);
    }

    #[test]
    fn manager_levels() {
        assert!(Role::Manager.is_manager_or_above());
        assert!(Role::Hr.is_manager_or_above());
        assert!(!Role::Employee.is_manager_or_above());
        assert!(!Role::ApiUser.is_manager_or_above());
    }
}
