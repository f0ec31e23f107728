mod lobby_lifecycle;
mod matchmaking;
