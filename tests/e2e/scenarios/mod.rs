mod happy_path;
mod history_capacity;
