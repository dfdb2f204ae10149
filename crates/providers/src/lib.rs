pub mod zai;
