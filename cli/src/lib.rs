pub mod methmix_commands;
