pub mod habit_logs;
pub mod habits;
pub mod settings;

pub use habit_logs::HabitLogQueries;
pub use habits::HabitQueries;
pub use settings::SettingsQueries;
