mod reqwest_attachment_fetcher;

pub use reqwest_attachment_fetcher::ReqwestAttachmentFetcher;
