pub mod conversation_cache;
pub mod conversation_dto;
pub mod conversation_handlers;
pub mod conversation_models;
pub mod conversation_repository;
pub mod conversation_service;

pub use conversation_models::{Conversation, Message, Participant, ParticipantRole};
