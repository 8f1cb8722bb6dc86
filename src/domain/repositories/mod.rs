pub mod settings_provider;
