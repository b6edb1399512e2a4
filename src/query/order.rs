use crate::storage::UserRecord;
use std::cmp::Reverse;
use std::str::FromStr;

/// Sort order for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserOrder {
    #[default]
    Login,
    GithubId,
    /// Most followed first
    NumFollowers,
    /// Most following first
    NumFollowing,
}

impl FromStr for UserOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "login" => Ok(Self::Login),
            "github-id" | "id" => Ok(Self::GithubId),
            "followers" => Ok(Self::NumFollowers),
            "following" => Ok(Self::NumFollowing),
            other => Err(format!(
                "unknown order '{}' (expected login, github-id, followers or following)",
                other
            )),
        }
    }
}

/// Sorts users in place; unsynced counts sort last
pub fn sort_users(users: &mut [UserRecord], order: UserOrder) {
    match order {
        UserOrder::Login => users.sort_by_key(|u| u.login.to_lowercase()),
        UserOrder::GithubId => users.sort_by_key(|u| u.github_id),
        UserOrder::NumFollowers => {
            users.sort_by_key(|u| (u.num_followers.is_none(), Reverse(u.num_followers)))
        }
        UserOrder::NumFollowing => {
            users.sort_by_key(|u| (u.num_following.is_none(), Reverse(u.num_following)))
        }
    }
}
