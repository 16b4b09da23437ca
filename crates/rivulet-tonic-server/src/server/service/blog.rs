//! `blog.BlogService`: record management over a [`RecordStore`].

use crate::server::{
    host::{Admission, CallHost},
    streaming::{ResponseStream, reply, spawn_streaming},
};
use rivulet::{
    CallShape,
    driver::{server_stream, unary},
    handler::records::RecordService,
    store::{MemoryStore, RecordStore},
};
use rivulet_tonic_core::{
    convert,
    proto::blog::{
        Blog, CreateBlogRequest, CreateBlogResponse, DeleteBlogRequest, DeleteBlogResponse,
        ListBlogRequest, ListBlogResponse, ReadBlogRequest, ReadBlogResponse, UpdateBlogRequest,
        UpdateBlogResponse, blog_service_server::BlogService,
    },
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::{Request, Response, Status};

#[derive(Debug)]
pub struct BlogHandler<S = MemoryStore> {
    host: CallHost,
    buffer: usize,
    records: Arc<RecordService<S>>,
}

impl<S> Clone for BlogHandler<S> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            buffer: self.buffer,
            records: Arc::clone(&self.records),
        }
    }
}

impl<S: RecordStore> BlogHandler<S> {
    pub fn new(host: CallHost, buffer: usize, records: RecordService<S>) -> Self {
        Self {
            host,
            buffer: buffer.max(1),
            records: Arc::new(records),
        }
    }

    pub fn records(&self) -> &RecordService<S> {
        &self.records
    }
}

#[tonic::async_trait]
impl<S: RecordStore + 'static> BlogService for BlogHandler<S> {
    type ListBlogStream = ResponseStream<ListBlogResponse>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn create_blog(
        &self,
        req: Request<CreateBlogRequest>,
    ) -> Result<Response<CreateBlogResponse>, Status> {
        let Admission { session, ticket } =
            self.host.admit("blog.CreateBlog", CallShape::Unary, &req)?;
        // A create request never carries a meaningful id.
        let (_, fields) = convert::split_blog(req.into_inner().blog);

        let records = Arc::clone(&self.records);
        let outcome = unary::drive(&session, fields, |fields, _| async move {
            records.create(fields).await
        })
        .await
        .map(|record| CreateBlogResponse {
            blog: Some(Blog::from(record)),
        });
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(blog_id = %req.get_ref().blog_id)))]
    async fn read_blog(
        &self,
        req: Request<ReadBlogRequest>,
    ) -> Result<Response<ReadBlogResponse>, Status> {
        let Admission { session, ticket } =
            self.host.admit("blog.ReadBlog", CallShape::Unary, &req)?;

        let records = Arc::clone(&self.records);
        let outcome = unary::drive(&session, req.into_inner().blog_id, |id, _| async move {
            records.read(&id).await
        })
        .await
        .map(|record| ReadBlogResponse {
            blog: Some(Blog::from(record)),
        });
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn update_blog(
        &self,
        req: Request<UpdateBlogRequest>,
    ) -> Result<Response<UpdateBlogResponse>, Status> {
        let Admission { session, ticket } =
            self.host.admit("blog.UpdateBlog", CallShape::Unary, &req)?;
        let update = convert::split_blog(req.into_inner().blog);

        let records = Arc::clone(&self.records);
        let outcome = unary::drive(&session, update, |(id, fields), _| async move {
            records.update(&id, fields).await
        })
        .await
        .map(|outcome| UpdateBlogResponse {
            status: outcome.to_string(),
        });
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(blog_id = %req.get_ref().blog_id)))]
    async fn delete_blog(
        &self,
        req: Request<DeleteBlogRequest>,
    ) -> Result<Response<DeleteBlogResponse>, Status> {
        let Admission { session, ticket } =
            self.host.admit("blog.DeleteBlog", CallShape::Unary, &req)?;

        let records = Arc::clone(&self.records);
        let outcome = unary::drive(&session, req.into_inner().blog_id, |id, _| async move {
            records.delete(&id).await
        })
        .await
        .map(|outcome| DeleteBlogResponse {
            status: outcome.to_string(),
        });
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn list_blog(
        &self,
        req: Request<ListBlogRequest>,
    ) -> Result<Response<Self::ListBlogStream>, Status> {
        let Admission { session, ticket } =
            self.host.admit("blog.ListBlog", CallShape::ServerStream, &req)?;
        session.request_received();

        let (tx, rx) = mpsc::channel(self.buffer);
        let mut outbound = session.outbound(tx);
        let records = Arc::clone(&self.records);
        let driver = async move {
            // Bounded by both the store timeout and the session.
            let opened = outbound
                .supervisor()
                .guard(records.list())
                .await
                .and_then(|opened| opened);
            match opened {
                Ok(source) => server_stream::drive(outbound, source).await,
                Err(err) => {
                    outbound.fail(err.clone());
                    Err(err)
                }
            }
        };

        Ok(spawn_streaming(
            ticket,
            rx,
            |record| ListBlogResponse {
                blog: Some(Blog::from(record)),
            },
            driver,
        ))
    }
}
