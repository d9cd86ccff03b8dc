pub mod diary;
pub mod emotions;
pub mod episodes;
pub mod facts;
pub mod messages;
pub mod relationship;
pub mod scenarios;
pub mod synthesis;
pub mod threads;
